mod account;
mod gate;
mod identity;

pub use account::{AccountService, MIN_PASSWORD_LEN, SignUpForm};
pub use gate::{AuthGate, GateState, SessionContext};
pub use identity::{Identity, IdentityProvider, LocalIdentityProvider};
