use serde::{Deserialize, Serialize};
use std::fmt;

/// Quote currencies recognised when splitting a concatenated exchange
/// symbol (eg/ `BTCUSDT`) into canonical `BASE-QUOTE` form. Order matters:
/// longer suffixes are checked first so `BUSD` is not mistaken for `USD`.
const QUOTE_CURRENCIES: &[&str] = &[
    "USDT", "USDC", "BUSD", "TUSD", "BNB", "BTC", "ETH", "USD", "EUR", "GBP", "JPY", "DAI",
];

/// Canonical trading pair in `BASE-QUOTE` form (eg/ `BTC-USDT`).
///
/// Construction always goes through [`Symbol::normalize`], so every
/// [`Symbol`] in the system is already in canonical form; there is no way
/// to construct one holding an un-normalized string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Normalize a raw exchange symbol into canonical `BASE-QUOTE` form.
    ///
    /// Rules (see `spec.md` §4.2):
    /// 1. A trailing `-SWAP` suffix (OKX perpetuals) is stripped first.
    /// 2. A string that already contains `-` is otherwise passed through
    ///    unchanged (just upper-cased), eg/ `btc-usdt` -> `BTC-USDT`.
    /// 3. Otherwise the quote currency is detected from [`QUOTE_CURRENCIES`]
    ///    and a `-` is inserted before it, eg/ `BTCUSDT` -> `BTC-USDT`.
    /// 4. A symbol with no `-` and no recognised quote suffix (eg/ a
    ///    Deribit options instrument id) is passed through as-is, per the
    ///    spec's Open Question resolution in DESIGN.md.
    pub fn normalize(raw: &str) -> Self {
        let upper = raw.to_ascii_uppercase();
        let stripped = upper.strip_suffix("-SWAP").unwrap_or(&upper);

        if stripped.contains('-') {
            return Self(stripped.to_string());
        }

        for quote in QUOTE_CURRENCIES {
            if stripped.len() > quote.len() && stripped.ends_with(quote) {
                let base = &stripped[..stripped.len() - quote.len()];
                return Self(format!("{base}-{quote}"));
            }
        }

        Self(stripped.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}

impl From<String> for Symbol {
    fn from(raw: String) -> Self {
        Self::normalize(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_concatenated_binance_symbol() {
        assert_eq!(Symbol::normalize("BTCUSDT").as_str(), "BTC-USDT");
        assert_eq!(Symbol::normalize("ethbtc").as_str(), "ETH-BTC");
    }

    #[test]
    fn passes_through_already_hyphenated_symbol() {
        assert_eq!(Symbol::normalize("BTC-USDT").as_str(), "BTC-USDT");
        assert_eq!(Symbol::normalize("btc-usdt").as_str(), "BTC-USDT");
    }

    #[test]
    fn strips_okx_swap_suffix() {
        assert_eq!(Symbol::normalize("BTC-USDT-SWAP").as_str(), "BTC-USDT");
    }

    #[test]
    fn symbol_normalization_is_idempotent_across_forms() {
        let forms = ["BTCUSDT", "BTC-USDT", "BTC-USDT-SWAP"];
        for form in forms {
            assert_eq!(Symbol::normalize(form).as_str(), "BTC-USDT", "form={form}");
        }
    }

    #[test]
    fn non_matching_symbol_passes_through_unchanged() {
        // Deribit options instrument id, ambiguous without expiry/strike parsing.
        assert_eq!(
            Symbol::normalize("BTC-30AUG24-70000-C").as_str(),
            "BTC-30AUG24-70000-C"
        );
    }

    #[test]
    fn prefers_longer_quote_suffix_match() {
        // Must not split BUSD as B + USD.
        assert_eq!(Symbol::normalize("BTCBUSD").as_str(), "BTC-BUSD");
    }
}
