pub mod amfi;
pub mod coingecko;
pub mod static_prices;
pub mod yahoo;

pub use amfi::AmfiNavSource;
pub use coingecko::{CoinGeckoOptions, CoinGeckoPriceSource};
pub use static_prices::{StaticPriceOptions, StaticPriceSource};
pub use yahoo::{ChartSourceOptions, YahooChartSource};
