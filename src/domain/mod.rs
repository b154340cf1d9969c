mod bank_account;
mod fund_transfer;
mod money;
mod posting;
mod session;
mod site;
mod summary;

pub use bank_account::*;
pub use fund_transfer::*;
pub use money::*;
pub use posting::*;
pub use session::*;
pub use site::*;
pub use summary::*;
