/// DEX matcher core library
/// Per-pair order books, reservation-aware validation, durable order
/// history and deterministic exchange-transaction emission.

pub mod account;
pub mod assets;
pub mod errors;
pub mod events;
pub mod fixedpoint;
pub mod history;
pub mod journal;
pub mod limit_order;
pub mod node;
pub mod order;
pub mod orderbook;
pub mod pair_actor;
pub mod script;
pub mod settings;
pub mod supervisor;
pub mod transaction;
pub mod validator;

pub use account::{Address, KeyPair, Proof, PublicKey};
pub use assets::{AssetId, AssetPair};
pub use errors::MatcherError;
pub use events::Event;
pub use history::{OpenPortfolio, OrderHistory, OrderInfo, OrderStatus};
pub use limit_order::LimitOrder;
pub use node::{BlockchainView, Clock, MatcherContext, UtxPool};
pub use order::{Order, OrderId, OrderSide};
pub use orderbook::{OrderBook, OrderBookSnapshot};
pub use pair_actor::{CancelResponse, PlacementResponse};
pub use settings::MatcherSettings;
pub use supervisor::Matcher;
pub use transaction::ExchangeTransaction;
