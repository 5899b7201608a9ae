pub mod jwt;
pub mod ledger;
pub mod password;
pub mod rewards;

pub use jwt::JwtService;
pub use ledger::{inc_once, release_marker, CoinLedger, IncOutcome, Posting};
pub use password::PasswordService;
pub use rewards::RewardService;
