pub mod quote;
pub mod resource;
pub mod watchlist;
