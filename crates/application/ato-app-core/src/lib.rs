pub mod app_core;
pub mod dashboard;
pub mod dispatcher;
pub mod domain;
pub mod kernel;
pub mod persistence;
pub mod ports;
pub mod rpc;
pub mod viewmodel;
pub mod wizard;

pub use app_core::*;
pub use dispatcher::EventDispatcher;
pub use domain::{AppState, ClientSettings, Slice, SliceKind};
pub use kernel::ClientKernel;
pub use ports::*;
pub use rpc::RpcBackend;
pub use viewmodel::*;
pub use wizard::ManufacturingWizard;
