use anyhow::Result;
use chrono::{Days, NaiveDate};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use trendcast_rs::{
    AnalysisError, Config, Momentum, PriceBar, PriceBook, ShortTermPrediction, Trend,
    TrendAnalyzer,
};

fn bars_from_closes(ticker: &str, closes: &[f64]) -> Vec<PriceBar> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceBar {
            date: start + Days::new(i as u64),
            ticker: ticker.to_string(),
            open: close * 0.995,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 10_000.0 + i as f64,
        })
        .collect()
}

fn noisy_closes(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut price = 100.0;
    (0..n)
        .map(|i| {
            price += (i as f64 * 0.15).sin() * 1.5 + rng.gen_range(-2.0..2.0);
            price = price.max(5.0);
            price
        })
        .collect()
}

fn small_grid_config() -> Config {
    let mut config = Config::default();
    config.n_workers = 2;
    config.training.tree_counts = vec![5, 10];
    config.training.max_depths = vec![Some(4), None];
    config
}

#[test]
fn rising_series_is_an_uptrend() -> Result<()> {
    let closes: Vec<f64> = (0..300).map(|i| 100.0 + i as f64).collect();
    let book = PriceBook::from_bars(bars_from_closes("RISE", &closes));
    let analyzer = TrendAnalyzer::new(small_grid_config())?;

    let history = analyzer.trend_history("RISE", &book).unwrap();
    // Rows 199..300 are fully defined.
    assert_eq!(history.len(), 101);
    let row_250 = history
        .iter()
        .find(|row| row.date == NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Days::new(250))
        .unwrap();
    assert!(row_250.sma_50 > row_250.sma_200);
    assert_eq!(row_250.trend, Trend::Uptrend);
    assert!(history.iter().all(|row| row.momentum == Momentum::Overbought));
    Ok(())
}

#[test]
fn fourteen_day_drop_is_oversold() -> Result<()> {
    let mut closes = noisy_closes(286, 3);
    let mut last = *closes.last().unwrap();
    for _ in 0..14 {
        last -= 1.0;
        closes.push(last);
    }
    let book = PriceBook::from_bars(bars_from_closes("DROP", &closes));
    let analyzer = TrendAnalyzer::new(small_grid_config())?;

    let history = analyzer.trend_history("DROP", &book).unwrap();
    let latest = history.last().unwrap();
    assert!(latest.rsi_14 < 30.0);
    assert_eq!(latest.momentum, Momentum::Oversold);
    Ok(())
}

#[test]
fn short_history_is_reported_not_raised() -> Result<()> {
    let closes: Vec<f64> = (0..60).map(|i| 50.0 + (i % 5) as f64).collect();
    let book = PriceBook::from_bars(bars_from_closes("SHORT", &closes));
    let analyzer = TrendAnalyzer::new(small_grid_config())?;

    assert!(analyzer.trend_history("SHORT", &book).unwrap().is_empty());
    let err = analyzer.analyze("SHORT", &book).unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::InsufficientHistory {
            available: 60,
            required: 200,
            ..
        }
    ));
    assert!(err.is_data_condition());
    Ok(())
}

#[test]
fn unknown_ticker_is_no_data() -> Result<()> {
    let book = PriceBook::from_bars(bars_from_closes("AAA", &[1.0, 2.0]));
    let analyzer = TrendAnalyzer::new(small_grid_config())?;
    assert!(matches!(
        analyzer.trend_history("ZZZ", &book),
        Err(AnalysisError::NoData { .. })
    ));
    assert!(matches!(
        analyzer.analyze("ZZZ", &book),
        Err(AnalysisError::NoData { .. })
    ));
    Ok(())
}

#[test]
fn constant_target_class_falls_back_to_not_available() -> Result<()> {
    let closes: Vec<f64> = (0..400).map(|i| 20.0 + i as f64 * 0.5).collect();
    let book = PriceBook::from_bars(bars_from_closes("UP", &closes));
    let analyzer = TrendAnalyzer::new(small_grid_config())?;

    let analysis = analyzer.analyze("UP", &book).unwrap();
    assert!(matches!(
        analysis.model_issue,
        Some(AnalysisError::DegenerateTraining { .. })
    ));
    assert!(analysis.model.is_none());
    assert_eq!(
        analysis.result.short_term_prediction,
        ShortTermPrediction::NotAvailable
    );
    assert_eq!(analysis.result.price_target, None);
    assert_eq!(analysis.result.long_term_outlook, Trend::Uptrend);
    assert_eq!(analysis.result.last_close_price, closes[399]);

    let record = analysis.result.to_record();
    assert_eq!(record.price_target, "N/A");
    assert_eq!(record.short_term_prediction, "N/A");
    Ok(())
}

#[test]
fn trained_model_yields_a_direction_and_target() -> Result<()> {
    let closes = noisy_closes(400, 11);
    let book = PriceBook::from_bars(bars_from_closes("NOISE", &closes));
    let analyzer = TrendAnalyzer::new(small_grid_config())?;

    let analysis = analyzer.analyze("NOISE", &book).unwrap();
    assert!(analysis.model_issue.is_none());
    let model = analysis.model.as_ref().unwrap();
    assert_eq!(model.features, vec!["SMA_50", "SMA_200", "RSI_14"]);
    assert!(model.train_rows > model.test_rows);
    assert!((0.0..=1.0).contains(&model.holdout_accuracy));
    assert_ne!(
        analysis.result.short_term_prediction,
        ShortTermPrediction::NotAvailable
    );
    assert!(analysis.result.price_target.unwrap() >= 0.0);
    assert_eq!(analysis.history.len(), 201);

    let again = analyzer.analyze("NOISE", &book).unwrap();
    assert_eq!(again.model, analysis.model);
    assert_eq!(again.result, analysis.result);
    Ok(())
}

#[test]
fn price_target_is_never_negative() -> Result<()> {
    let analyzer = TrendAnalyzer::new(small_grid_config())?;
    for seed in 0..4 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut closes: Vec<f64> = (0..310).map(|_| rng.gen_range(0.5..6.0)).collect();
        // A single spike in the final band window drags the lower band below zero.
        closes.extend((0..20).map(|i| if i == 15 { 30.0 } else { 1.0 }));
        let book = PriceBook::from_bars(bars_from_closes("PENNY", &closes));
        let analysis = analyzer.analyze("PENNY", &book).unwrap();
        let latest = analysis.history.last().unwrap();
        assert!(latest.bb_lower < 0.0);
        if let Some(target) = analysis.result.price_target {
            assert!(target >= 0.0);
        }
    }
    Ok(())
}

#[test]
fn report_window_is_capped_at_one_trading_year() -> Result<()> {
    let closes = noisy_closes(600, 5);
    let book = PriceBook::from_bars(bars_from_closes("LONG", &closes));
    let analyzer = TrendAnalyzer::new(small_grid_config())?;

    let history = analyzer.trend_history("LONG", &book).unwrap();
    assert_eq!(history.len(), 252);
    assert_eq!(history.last().unwrap().close, closes[599]);
    Ok(())
}

#[test]
fn analyze_all_isolates_ticker_failures() -> Result<()> {
    let mut bars = bars_from_closes("SHORT", &[10.0; 30]);
    bars.extend(bars_from_closes("NOISE", &noisy_closes(350, 2)));
    let book = PriceBook::from_bars(bars);
    let analyzer = TrendAnalyzer::new(small_grid_config())?;

    let results = analyzer.analyze_all(&book);
    let tickers: Vec<&str> = results.iter().map(|(ticker, _)| ticker.as_str()).collect();
    assert_eq!(tickers, vec!["SHORT", "NOISE"]);
    assert!(results[0].1.is_err());
    assert!(results[1].1.is_ok());
    Ok(())
}
