//! Domain values for the RPC session.

pub mod credentials;
pub mod types;

pub use credentials::{RpcCredentials, RpcEndpoint, TOR_SOCKS_PROXY};
pub use types::{
    BlockchainInfo, NodeInfo, OperationError, OperationResult, OperationState, OperationStatus,
    Recipient, ShieldedNote, SyncInfo, TransparentUtxo, WalletTransaction, SYNCED_PROGRESS,
};
