use serde::{Deserialize, Serialize};

/// A non-native asset identifier. The native asset is represented as
/// `None` wherever an `Option<AssetId>` appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub [u8; 32]);

impl AssetId {
    pub fn from_base58(s: &str) -> Result<Self, String> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| format!("invalid base58 asset id: {}", e))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "asset id must be 32 bytes".to_string())?;
        Ok(AssetId(arr))
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

/// Renders an optional asset, using the conventional name for the native
/// asset.
pub fn asset_name(asset: &Option<AssetId>) -> String {
    match asset {
        Some(id) => id.to_string(),
        None => "NATIVE".to_string(),
    }
}

/// The two sides of a trading pair. Price is quoted in price-asset units
/// per amount-asset unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetPair {
    pub amount_asset: Option<AssetId>,
    pub price_asset: Option<AssetId>,
}

impl AssetPair {
    pub fn new(amount_asset: Option<AssetId>, price_asset: Option<AssetId>) -> Self {
        AssetPair {
            amount_asset,
            price_asset,
        }
    }

    /// Stable textual key, used for routing and persistence trees.
    pub fn key(&self) -> String {
        format!(
            "{}-{}",
            asset_name(&self.amount_asset),
            asset_name(&self.price_asset)
        )
    }
}

impl std::fmt::Display for AssetPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}
