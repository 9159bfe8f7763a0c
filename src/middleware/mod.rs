pub mod rpc_auth;

pub use rpc_auth::bearer_auth_middleware;
