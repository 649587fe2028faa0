pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod item;
pub mod session;
pub mod transport;

pub use cache::{FeedCache, GetOptions};
pub use config::{AppConfig, ApiConfig, FeedSettings, ReviewConfig, LIKES_FEED, NEWS_FEED};
pub use coordinator::{SessionCoordinator, ViewOptions, ViewState};
pub use error::{FetchError, ReactionError};
pub use gateway::ReactionGateway;
pub use item::{FeedKey, FeedSnapshot, LastReaction, NewsItem, ReactionKind};
pub use session::ReviewSession;
pub use transport::{bounded, HttpTransport, Transport};
