pub mod builder;
pub mod handler;
pub mod listener;
pub mod websocket;

pub use builder::ServerBuilder;
pub use handler::RequestHandler;
pub use websocket::WebSocketServer;
