mod config;
mod encoding;
mod lifecycle;
mod paginator;
mod params;
mod reply;
mod request;
mod server;

pub use config::Config;
pub use config::ConfigError;
pub use lifecycle::Lifecycle;
pub use lifecycle::spawn_signal_watcher;
pub use paginator::PAGE_SIZE;
pub use paginator::Paginator;
pub use params::ParamError;
pub use params::Params;
pub use reply::Envelope;
pub use reply::Fault;
pub use reply::Reply;
pub use reply::ReplyError;
pub use reply::SERVER_UA;
pub use reply::Wire;
pub use reply::WireSender;
pub use request::Request;
pub use server::BindAddr;
pub use server::ServeError;
pub use server::Server;
pub use server::ServerBuildError;
pub use server::ServerBuilder;
