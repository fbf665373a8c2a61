//! Board settings file loading tests.

use std::path::PathBuf;

use rust_decimal_macros::dec;

use priceboard::PriceBoardError;
use priceboard::adjust::adjust;
use priceboard::config::BoardConfig;

/// Helper to get the path to test fixtures directory.
fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

#[test]
fn loads_board_fixture() {
    let config = BoardConfig::load(&fixtures_dir().join("board.json")).unwrap();

    assert_eq!(config.api_url, "https://prices.example.com/api/feed");
    assert_eq!(config.ttl_seconds, 900);
    assert_eq!(config.max_visible_popups, 3);
    assert_eq!(config.fetch_timeout_seconds, 30);
    let symbols: Vec<&str> = config.symbols.iter().map(|s| s.symbol.as_str()).collect();
    assert_eq!(symbols, ["GOLD18", "USD", "BTC"]);
}

#[test]
fn fixture_adjustments_price_as_configured() {
    let config = BoardConfig::load(&fixtures_dir().join("board.json")).unwrap();

    let gold = adjust(dec!(1000000), &config.symbols[0]).unwrap();
    assert_eq!(gold.single(), Some(dec!(1052000)));

    let usd = adjust(dec!(1000000), &config.symbols[1]).unwrap();
    assert_eq!(usd.sell(), Some(dec!(1030000)));
    assert_eq!(usd.buy(), Some(dec!(1010000)));
    assert_eq!(usd.reference_price(), dec!(1030000));

    let btc = adjust(dec!(65000.5), &config.symbols[2]).unwrap();
    assert_eq!(btc.single(), Some(dec!(65000.5)));
}

#[test]
fn invalid_fixture_is_rejected() {
    let err = BoardConfig::load(&fixtures_dir().join("invalid_board.json")).unwrap_err();
    assert!(matches!(err, PriceBoardError::Config(_)));
    assert!(err.to_string().contains("maxVisiblePopups"));
}

#[test]
fn missing_settings_file_is_reported() {
    let err = BoardConfig::load(&fixtures_dir().join("nonexistent.json")).unwrap_err();
    assert!(matches!(err, PriceBoardError::ConfigMissing(_)));
    assert!(err.to_string().contains("save the board settings first"));
}
