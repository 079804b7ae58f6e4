mod flags;
mod record;
mod store;

pub use flags::{BlurIntensity, FilterType};
pub use record::{SessionRecord, SessionSnapshot, SESSION_SLOT_NAME};
pub use store::SessionStore;
