mod handler;
mod message;
mod session;

pub use handler::{ws_handler, WsQuery, TENANT_HEADER};
pub use message::{
    ClientMessage, EmitPayload, FrameMeta, IdentifyPayload, OutboundMessage, RoomRequest,
    ServerMessage,
};
pub use session::ConnectionSession;
