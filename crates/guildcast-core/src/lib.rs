pub mod events;
pub mod ids;

pub use events::{Envelope, GatewayEvent};
pub use ids::{ConnectionId, GuildId};
