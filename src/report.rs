use crate::aggregate::{bucketize, mean, BucketStats};
use crate::analysis::audit::PipelineAudit;
use crate::analysis::bootstrap::BlockBootstrap;
use crate::analysis::concentration::ConcentrationStress;
use crate::analysis::costs::CostSensitivity;
use crate::analysis::factors::FactorRegression;
use crate::analysis::newey_west::NeweyWest;
use crate::analysis::pnl::PnlReconciliation;
use crate::analysis::portfolio::RollingPortfolio;
use crate::analysis::regime::RegimeAnalysis;
use crate::analysis::AnalysisResult;
use crate::config::RunConfig;
use crate::models::{ActedReason, Bucket, Pick, Sentiment};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write;

/// Analyzer output bundle for the main report.
pub struct BacktestAnalyses {
    pub portfolio: AnalysisResult<RollingPortfolio>,
    pub regime: AnalysisResult<RegimeAnalysis>,
    pub bootstrap: AnalysisResult<BlockBootstrap>,
    pub newey_west: AnalysisResult<NeweyWest>,
}

/// Analyzer output bundle for the robustness report.
pub struct RobustnessAnalyses {
    pub audit: AnalysisResult<PipelineAudit>,
    pub concentration: AnalysisResult<ConcentrationStress>,
    pub bootstrap: AnalysisResult<BlockBootstrap>,
    pub newey_west: AnalysisResult<NeweyWest>,
    pub factors: AnalysisResult<FactorRegression>,
    pub costs: AnalysisResult<CostSensitivity>,
    pub pnl: AnalysisResult<PnlReconciliation>,
}

fn pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:+.1}%", v * 100.0),
        None => "N/A".to_string(),
    }
}

fn pct2(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:+.2}%", v * 100.0),
        None => "N/A".to_string(),
    }
}

fn rate(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.0}%", v * 100.0),
        None => "N/A".to_string(),
    }
}

fn num2(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "N/A".to_string(),
    }
}

fn acted_label(pick: &Pick) -> &'static str {
    match pick.acted_reason {
        ActedReason::Held => "held",
        ActedReason::Traded => "traded",
        ActedReason::NotActed => "-",
    }
}

fn sentiment_label(sentiment: Sentiment) -> &'static str {
    match sentiment {
        Sentiment::Bullish => "Bull",
        Sentiment::Bearish => "Bear",
        Sentiment::Neutral => "Neutral",
        Sentiment::Unknown => "Unknown",
    }
}

/// Render the main backtest report as Markdown. Every section is always
/// present; sections whose analysis lacked data carry an explicit
/// placeholder so "no signal" never reads as "no attempt".
pub fn render_backtest(
    stats: &BTreeMap<Bucket, BucketStats>,
    picks: &[Pick],
    meetings_count: usize,
    analyses: &BacktestAnalyses,
    config: &RunConfig,
) -> String {
    let mut out = String::new();
    let unique_tickers: HashSet<&str> = picks.iter().map(|p| p.ticker.as_str()).collect();

    let _ = writeln!(out, "---");
    let _ = writeln!(out, "date: {}", config.as_of);
    let _ = writeln!(out, "type: backtest");
    let _ = writeln!(out, "meetings_analyzed: {}", meetings_count);
    let _ = writeln!(out, "unique_tickers: {}", unique_tickers.len());
    let _ = writeln!(out, "total_picks: {}", picks.len());
    let _ = writeln!(out, "---");
    let _ = writeln!(out);
    let _ = writeln!(out, "# Meeting Picks Backtest");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "> {} meetings, {} tickers, {} mentions. Each mention is grouped by sentiment x acted-on status and measured over {} day forward windows.",
        meetings_count,
        unique_tickers.len(),
        picks.len(),
        config
            .main_windows
            .iter()
            .map(|w| w.to_string())
            .collect::<Vec<_>>()
            .join("/")
    );
    let _ = writeln!(out);

    summary_table(&mut out, stats, &config.main_windows);
    insights(&mut out, stats, picks);
    excess_table(&mut out, stats, &config.main_windows);
    entry_sensitivity_table(&mut out, stats, &config.entry_offsets);
    decay_curve(&mut out, picks, &config.all_windows);
    held_vs_traded(&mut out, picks, &config.main_windows);
    portfolio_section(&mut out, &analyses.portfolio);
    regime_section(&mut out, &analyses.regime);
    bootstrap_section(&mut out, &analyses.bootstrap);
    newey_west_section(&mut out, &analyses.newey_west);
    movers(&mut out, picks, config);
    frequency(&mut out, picks);
    missing_data(&mut out, picks, &config.main_windows);
    detail_table(&mut out, picks, &config.main_windows);

    out
}

fn summary_table(out: &mut String, stats: &BTreeMap<Bucket, BucketStats>, windows: &[u32]) {
    let _ = writeln!(out, "## Summary");
    let _ = writeln!(out);
    let mut header = "| Group | Count |".to_string();
    let mut separator = "| --- | ---: |".to_string();
    for w in windows {
        let _ = write!(header, " {}d mean | {}d median | {}d win rate |", w, w, w);
        separator.push_str(" ---: | ---: | ---: |");
    }
    let _ = writeln!(out, "{}", header);
    let _ = writeln!(out, "{}", separator);

    for bucket in Bucket::ALL {
        let Some(s) = stats.get(&bucket) else { continue };
        let mut row = format!("| {} | {} |", bucket.label(), s.count);
        for w in windows {
            let ws = s.windows.get(w).cloned().unwrap_or_default();
            let wr = match ws.win_rate {
                Some(r) => format!("{:.0}% ({})", r * 100.0, ws.n),
                None => "N/A".to_string(),
            };
            let _ = write!(row, " {} | {} | {} |", pct(ws.mean), pct(ws.median), wr);
        }
        let _ = writeln!(out, "{}", row);
    }
    let _ = writeln!(out);
}

fn insights(out: &mut String, stats: &BTreeMap<Bucket, BucketStats>, picks: &[Pick]) {
    let _ = writeln!(out, "## Key Findings");
    let _ = writeln!(out);
    let w = 30u32;
    let get = |bucket: Bucket| stats.get(&bucket).and_then(|s| s.windows.get(&w)).cloned();

    let ba = get(Bucket::BullishActed).unwrap_or_default();
    let bd = get(Bucket::BullishDiscussed).unwrap_or_default();
    let bed = get(Bucket::BearishDiscussed).unwrap_or_default();
    let mut n = 0usize;

    if let (Some(acted), Some(discussed)) = (ba.mean, bd.mean) {
        n += 1;
        if acted > discussed {
            let _ = writeln!(
                out,
                "{}. **Execution added value:** bullish picks that were acted on averaged {} over 30d vs {} for bullish picks left on the table.",
                n,
                pct(Some(acted)),
                pct(Some(discussed))
            );
        } else {
            let _ = writeln!(
                out,
                "{}. **Missed opportunities:** bullish picks left untraded averaged {} over 30d, beating the {} of the ones acted on.",
                n,
                pct(Some(discussed)),
                pct(Some(acted))
            );
        }
    }

    if let Some(bear) = bed.mean {
        n += 1;
        if bear < 0.0 {
            let _ = writeln!(
                out,
                "{}. **Bearish calls were right:** avoided names fell {} on average over 30d.",
                n,
                pct(Some(bear))
            );
        } else {
            let _ = writeln!(
                out,
                "{}. **Bearish calls missed:** avoided names still rose {} on average over 30d.",
                n,
                pct(Some(bear))
            );
        }
    }

    if let (Some(wr_a), Some(wr_d)) = (ba.win_rate, bd.win_rate) {
        n += 1;
        let _ = writeln!(
            out,
            "{}. **Win rates:** {} acted vs {} discussed-only (share of positive 30d returns).",
            n,
            rate(Some(wr_a)),
            rate(Some(wr_d))
        );
    }

    let bullish: Vec<&Pick> = picks
        .iter()
        .filter(|p| p.sentiment == Sentiment::Bullish && p.ret(w).is_some())
        .collect();
    if !bullish.is_empty() {
        let correct = bullish.iter().filter(|p| p.ret(w).unwrap_or(0.0) > 0.0).count();
        n += 1;
        let _ = writeln!(
            out,
            "{}. **Bullish hit rate:** {}/{} calls were up after 30 days.",
            n,
            correct,
            bullish.len()
        );
    }

    if let Some(excess) = ba.excess_mean {
        n += 1;
        if excess > 0.005 {
            let _ = writeln!(
                out,
                "{}. **Benchmark-adjusted alpha:** bullish+acted excess of {} over 30d survives the market leg.",
                n,
                pct(Some(excess))
            );
        } else if excess > -0.005 {
            let _ = writeln!(
                out,
                "{}. **No alpha after the benchmark:** bullish+acted 30d excess is only {}.",
                n,
                pct(Some(excess))
            );
        } else {
            let _ = writeln!(
                out,
                "{}. **Underperformed the benchmark:** bullish+acted 30d excess is {}.",
                n,
                pct(Some(excess))
            );
        }
    }

    if n == 0 {
        let _ = writeln!(out, "*insufficient data: no 30d statistics available*");
    }
    let _ = writeln!(out);
}

fn excess_table(out: &mut String, stats: &BTreeMap<Bucket, BucketStats>, windows: &[u32]) {
    let _ = writeln!(out, "## Benchmark-Adjusted Excess Returns");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "> Each pick's return minus the benchmark return over the same window. Positive = beat the market."
    );
    let _ = writeln!(out);
    let mut header = "| Group | Count |".to_string();
    let mut separator = "| --- | ---: |".to_string();
    for w in windows {
        let _ = write!(header, " {}d excess mean | {}d excess median | {}d beat rate |", w, w, w);
        separator.push_str(" ---: | ---: | ---: |");
    }
    let _ = writeln!(out, "{}", header);
    let _ = writeln!(out, "{}", separator);
    for bucket in Bucket::ALL {
        let Some(s) = stats.get(&bucket) else { continue };
        let mut row = format!("| {} | {} |", bucket.label(), s.count);
        for w in windows {
            let ws = s.windows.get(w).cloned().unwrap_or_default();
            let _ = write!(
                row,
                " {} | {} | {} |",
                pct(ws.excess_mean),
                pct(ws.excess_median),
                rate(ws.excess_win_rate)
            );
        }
        let _ = writeln!(out, "{}", row);
    }
    let _ = writeln!(out);
}

fn entry_sensitivity_table(
    out: &mut String,
    stats: &BTreeMap<Bucket, BucketStats>,
    offsets: &[u32],
) {
    let _ = writeln!(out, "## Entry Sensitivity");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "> 30d returns with the entry booked 0/1/2 days after the meeting. If offset 0 clearly beats 1 and 2, the headline rides closes nobody could have traded."
    );
    let _ = writeln!(out);
    let mut header = "| Group |".to_string();
    let mut separator = "| --- |".to_string();
    for offset in offsets {
        let _ = write!(header, " Off.{} mean |", offset);
        separator.push_str(" ---: |");
    }
    for offset in offsets {
        let _ = write!(header, " Off.{} median |", offset);
        separator.push_str(" ---: |");
    }
    let _ = writeln!(out, "{}", header);
    let _ = writeln!(out, "{}", separator);
    for bucket in Bucket::ALL {
        let Some(s) = stats.get(&bucket) else { continue };
        let mut row = format!("| {} |", bucket.label());
        for offset in offsets {
            let os = s.entry_offsets.get(offset).cloned().unwrap_or_default();
            let _ = write!(row, " {} |", pct(os.mean));
        }
        for offset in offsets {
            let os = s.entry_offsets.get(offset).cloned().unwrap_or_default();
            let _ = write!(row, " {} |", pct(os.median));
        }
        let _ = writeln!(out, "{}", row);
    }
    let _ = writeln!(out);
}

fn decay_curve(out: &mut String, picks: &[Pick], windows: &[u32]) {
    let _ = writeln!(out, "## Alpha Decay Curve");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "> Mean excess return by holding period. The peak marks the natural exit tempo; the sign flip marks where to be out."
    );
    let _ = writeln!(out);
    let key_buckets = [
        Bucket::BullishActed,
        Bucket::BullishDiscussed,
        Bucket::BearishActed,
        Bucket::BearishDiscussed,
    ];
    let mut header = "| Holding |".to_string();
    let mut separator = "| ---: |".to_string();
    for bucket in key_buckets {
        let _ = write!(header, " {} |", bucket.label());
        separator.push_str(" ---: |");
    }
    let _ = writeln!(out, "{}", header);
    let _ = writeln!(out, "{}", separator);

    let grouped = bucketize(picks);
    for w in windows {
        let mut row = format!("| {}d |", w);
        for bucket in key_buckets {
            let excess: Vec<f64> = grouped
                .get(&bucket)
                .map(|members| members.iter().filter_map(|p| p.excess(*w)).collect())
                .unwrap_or_default();
            let _ = write!(row, " {} |", pct(mean(&excess)));
        }
        let _ = writeln!(out, "{}", row);
    }
    let _ = writeln!(out);
}

fn held_vs_traded(out: &mut String, picks: &[Pick], windows: &[u32]) {
    let _ = writeln!(out, "## Held vs Window Trades");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "> Positions already on the book at meeting time vs fills placed in the surrounding window: was the meeting a confirmation or a signal source?"
    );
    let _ = writeln!(out);

    let held: Vec<&Pick> = picks
        .iter()
        .filter(|p| p.acted_reason == ActedReason::Held)
        .collect();
    let traded: Vec<&Pick> = picks
        .iter()
        .filter(|p| p.acted_reason == ActedReason::Traded)
        .collect();
    let untraded: Vec<&Pick> = picks.iter().filter(|p| !p.acted_on).collect();

    let _ = writeln!(out, "- **Held:** {} picks with a position on the meeting date", held.len());
    let _ = writeln!(out, "- **Traded:** {} picks with a fill inside the window", traded.len());
    let _ = writeln!(out, "- **Untouched:** {} picks", untraded.len());
    let _ = writeln!(out);

    let mut header = "| Status | Count |".to_string();
    let mut separator = "| --- | ---: |".to_string();
    for w in windows {
        let _ = write!(header, " {}d mean | {}d excess |", w, w);
        separator.push_str(" ---: | ---: |");
    }
    let _ = writeln!(out, "{}", header);
    let _ = writeln!(out, "{}", separator);
    for (label, group) in [("Held", &held), ("Traded", &traded), ("Untouched", &untraded)] {
        let mut row = format!("| {} | {} |", label, group.len());
        for w in windows {
            let rets: Vec<f64> = group.iter().filter_map(|p| p.ret(*w)).collect();
            let excess: Vec<f64> = group.iter().filter_map(|p| p.excess(*w)).collect();
            let _ = write!(row, " {} | {} |", pct(mean(&rets)), pct(mean(&excess)));
        }
        let _ = writeln!(out, "{}", row);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "### By Sentiment x Position Status (30d)");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Sentiment | Status | Count | 30d mean | 30d excess |");
    let _ = writeln!(out, "| --- | --- | ---: | ---: | ---: |");
    for sentiment in [Sentiment::Bullish, Sentiment::Bearish] {
        for (label, reason) in [
            ("Held", Some(ActedReason::Held)),
            ("Traded", Some(ActedReason::Traded)),
            ("Untouched", None),
        ] {
            let group: Vec<&Pick> = picks
                .iter()
                .filter(|p| p.sentiment == sentiment)
                .filter(|p| match reason {
                    Some(r) => p.acted_reason == r,
                    None => !p.acted_on,
                })
                .collect();
            if group.is_empty() {
                continue;
            }
            let rets: Vec<f64> = group.iter().filter_map(|p| p.ret(30)).collect();
            let excess: Vec<f64> = group.iter().filter_map(|p| p.excess(30)).collect();
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                sentiment_label(sentiment),
                label,
                group.len(),
                pct(mean(&rets)),
                pct(mean(&excess))
            );
        }
    }
    let _ = writeln!(out);
}

fn portfolio_section(out: &mut String, result: &AnalysisResult<RollingPortfolio>) {
    let _ = writeln!(out, "## Rolling Portfolio Simulation");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "> One equal-weight basket of bullish picks per meeting, held 30 days, compounded in sequence."
    );
    let _ = writeln!(out);

    let portfolio = match result {
        Ok(p) => p,
        Err(e) => {
            let _ = writeln!(out, "*{}*", e);
            let _ = writeln!(out);
            return;
        }
    };

    let _ = writeln!(out, "| Metric | Raw | Excess |");
    let _ = writeln!(out, "| --- | ---: | ---: |");
    let _ = writeln!(
        out,
        "| Total return | {} | {} |",
        pct(Some(portfolio.total_return)),
        pct(Some(portfolio.total_excess))
    );
    let _ = writeln!(out, "| Annualized return | {} | - |", pct(Some(portfolio.ann_return)));
    let _ = writeln!(out, "| Annualized vol | {} | - |", pct(Some(portfolio.ann_vol)));
    let _ = writeln!(
        out,
        "| Sharpe | {} | {} |",
        num2(Some(portfolio.sharpe)),
        num2(portfolio.excess_sharpe)
    );
    let _ = writeln!(
        out,
        "| Max drawdown | {} | {} |",
        pct(Some(portfolio.max_drawdown)),
        pct(Some(portfolio.max_drawdown_excess))
    );
    let _ = writeln!(out, "| Basket win rate | {} | - |", rate(Some(portfolio.win_rate)));
    let _ = writeln!(
        out,
        "| Mean basket return | {} | - |",
        pct(Some(portfolio.mean_basket_return))
    );
    let _ = writeln!(
        out,
        "| Median basket return | {} | - |",
        pct(Some(portfolio.median_basket_return))
    );
    let _ = writeln!(out, "| Skewness | {} | - |", num2(Some(portfolio.skewness)));
    let _ = writeln!(out, "| Excess kurtosis | {} | - |", num2(Some(portfolio.excess_kurtosis)));
    let _ = writeln!(out, "| Baskets | {} | - |", portfolio.baskets.len());
    let _ = writeln!(
        out,
        "| Avg picks per basket | {:.1} | - |",
        portfolio.avg_picks_per_basket
    );
    let _ = writeln!(out, "| Span | {:.1} years | - |", portfolio.years);
    let _ = writeln!(out);

    let _ = writeln!(out, "### Baskets");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Date | Picks | 30d return | 30d excess |");
    let _ = writeln!(out, "| --- | ---: | ---: | ---: |");
    for basket in &portfolio.baskets {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            basket.date,
            basket.n_picks,
            pct(Some(basket.mean_return)),
            pct(basket.mean_excess)
        );
    }
    let _ = writeln!(out);
}

fn regime_section(out: &mut String, result: &AnalysisResult<RegimeAnalysis>) {
    let _ = writeln!(out, "## Regime Conditioning");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "> Excess returns split by market environment. Alpha confined to one regime is leveraged beta in disguise."
    );
    let _ = writeln!(out);

    let regime = match result {
        Ok(r) => r,
        Err(e) => {
            let _ = writeln!(out, "*{}*", e);
            let _ = writeln!(out);
            return;
        }
    };

    if let Some(median) = regime.vol_median {
        let _ = writeln!(out, "Vol index period median: **{:.1}**", median);
        let _ = writeln!(out);
    }
    let _ = writeln!(
        out,
        "| Regime | Picks | Bull | Bear | Bull 30d excess | Bull beat rate | Bear 30d excess |"
    );
    let _ = writeln!(out, "| --- | ---: | ---: | ---: | ---: | ---: | ---: |");
    for row in &regime.rows {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} |",
            row.regime.label(),
            row.total_picks,
            row.bullish_n,
            row.bearish_n,
            pct(row.bullish_excess),
            rate(row.bullish_win_rate),
            pct(row.bearish_excess)
        );
    }
    let _ = writeln!(out);
}

fn bootstrap_section(out: &mut String, result: &AnalysisResult<BlockBootstrap>) {
    let _ = writeln!(out, "## Cluster-Robust Bootstrap");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "> Meetings are resampled whole: picks made in one meeting share the same tape and the same state of mind, so pick-level resampling overstates the effective sample."
    );
    let _ = writeln!(out);

    let boot = match result {
        Ok(b) => b,
        Err(e) => {
            let _ = writeln!(out, "*{}*", e);
            let _ = writeln!(out);
            return;
        }
    };

    let _ = writeln!(out, "| Metric | Block | Naive |");
    let _ = writeln!(out, "| --- | ---: | ---: |");
    let _ = writeln!(
        out,
        "| Observed 30d excess | {} | - |",
        pct2(Some(boot.actual_excess))
    );
    let _ = writeln!(
        out,
        "| Standard error | {:.3}% | {:.3}% |",
        boot.block_se * 100.0,
        boot.naive_se * 100.0
    );
    let _ = writeln!(
        out,
        "| 95% CI | [{}, {}] | [{}, {}] |",
        pct2(Some(boot.block_ci_95.0)),
        pct2(Some(boot.block_ci_95.1)),
        pct2(Some(boot.naive_ci_95.0)),
        pct2(Some(boot.naive_ci_95.1))
    );
    let _ = writeln!(
        out,
        "| 90% CI | [{}, {}] | - |",
        pct2(Some(boot.block_ci_90.0)),
        pct2(Some(boot.block_ci_90.1))
    );
    let _ = writeln!(
        out,
        "| CI width ratio (block/naive) | {} | - |",
        match boot.ci_width_ratio {
            Some(ratio) => format!("{:.2}x", ratio),
            None => "N/A".to_string(),
        }
    );
    let _ = writeln!(
        out,
        "| Observed percentile | {:.0}% | - |",
        boot.block_percentile
    );
    let _ = writeln!(out, "| Zero inside 95% CI | {} | - |", yes_no(boot.zero_in_ci_95));
    let _ = writeln!(out, "| Zero inside 90% CI | {} | - |", yes_no(boot.zero_in_ci_90));
    let _ = writeln!(
        out,
        "| Iterations / meetings / picks | {} / {} / {} | - |",
        boot.n_iterations, boot.n_meetings, boot.n_picks
    );
    let _ = writeln!(out);

    if boot.zero_in_ci_95 {
        let _ = writeln!(
            out,
            "> Zero sits inside the 95% CI: clustering widens the interval enough that alpha = 0 cannot be ruled out at the 5% level."
        );
    } else {
        let _ = writeln!(
            out,
            "> Zero is outside the 95% CI: the excess survives meeting-level clustering."
        );
    }
    let _ = writeln!(out);
}

fn newey_west_section(out: &mut String, result: &AnalysisResult<NeweyWest>) {
    let _ = writeln!(out, "## Newey-West Standard Errors");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "> Per-meeting mean excess as a time series; Bartlett-kernel long-run variance corrects for serial correlation in repeated same-direction calls."
    );
    let _ = writeln!(out);

    let nw = match result {
        Ok(n) => n,
        Err(e) => {
            let _ = writeln!(out, "*{}*", e);
            let _ = writeln!(out);
            return;
        }
    };

    let _ = writeln!(out, "| Metric | OLS | Newey-West |");
    let _ = writeln!(out, "| --- | ---: | ---: |");
    let _ = writeln!(out, "| Mean excess | {} | - |", pct2(Some(nw.mean_excess)));
    let _ = writeln!(
        out,
        "| Standard error | {:.3}% | {:.3}% |",
        nw.ols_se * 100.0,
        nw.nw_se * 100.0
    );
    let _ = writeln!(out, "| t-statistic | {:.2} | {:.2} |", nw.t_ols, nw.t_nw);
    let _ = writeln!(out, "| p-value | {:.4} | {:.4} |", nw.p_ols, nw.p_nw);
    let _ = writeln!(
        out,
        "| Significant at 5% | {} | {} |",
        yes_no(nw.significant_5pct_ols),
        yes_no(nw.significant_5pct_nw)
    );
    let _ = writeln!(
        out,
        "| Significant at 10% | - | {} |",
        yes_no(nw.significant_10pct_nw)
    );
    let _ = writeln!(
        out,
        "| SE inflation | - | {} |",
        match nw.se_inflation {
            Some(inflation) => format!("{:.2}x", inflation),
            None => "N/A".to_string(),
        }
    );
    let _ = writeln!(out, "| Bandwidth L | - | {} |", nw.bandwidth);
    let _ = writeln!(out, "| Meetings | {} | - |", nw.n_meetings);
    let _ = writeln!(out);

    if !nw.autocorrelations.is_empty() {
        let autocorr: Vec<String> = nw
            .autocorrelations
            .iter()
            .map(|(lag, value)| format!("lag{}={:.3}", lag, value))
            .collect();
        let _ = writeln!(out, "Residual autocorrelations: {}", autocorr.join(", "));
        let _ = writeln!(out);
    }
}

fn movers(out: &mut String, picks: &[Pick], config: &RunConfig) {
    let _ = writeln!(out, "## Best and Worst Picks");
    let _ = writeln!(out);

    let mut priced: Vec<&Pick> = picks.iter().filter(|p| p.ret(30).is_some()).collect();
    if priced.is_empty() {
        let _ = writeln!(out, "*insufficient data: no picks with a 30d return*");
        let _ = writeln!(out);
        return;
    }
    priced.sort_by(|a, b| {
        b.ret(30)
            .partial_cmp(&a.ret(30))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let row = |pick: &Pick| -> String {
        let mut row = format!(
            "| {} | {} | {} | {} |",
            pick.meeting_date,
            pick.ticker,
            sentiment_label(pick.sentiment),
            acted_label(pick)
        );
        for w in &config.main_windows {
            let _ = write!(row, " {} |", pct(pick.ret(*w)));
        }
        row
    };
    let mut header = "| Date | Ticker | View | Acted |".to_string();
    let mut separator = "| --- | --- | --- | --- |".to_string();
    for w in &config.main_windows {
        let _ = write!(header, " {}d |", w);
        separator.push_str(" ---: |");
    }

    let _ = writeln!(out, "### Top 10 by 30d Return");
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", header);
    let _ = writeln!(out, "{}", separator);
    for pick in priced.iter().take(10) {
        let _ = writeln!(out, "{}", row(pick));
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "### Bottom 10 by 30d Return");
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", header);
    let _ = writeln!(out, "{}", separator);
    for pick in priced.iter().rev().take(10) {
        let _ = writeln!(out, "{}", row(pick));
    }
    let _ = writeln!(out);

    let mut missed: Vec<&&Pick> = priced
        .iter()
        .filter(|p| p.sentiment == Sentiment::Bullish && !p.acted_on)
        .collect();
    if !missed.is_empty() {
        missed.sort_by(|a, b| {
            b.ret(30)
                .partial_cmp(&a.ret(30))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let _ = writeln!(out, "### Missed Opportunities (bullish, untraded, best 30d)");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Date | Ticker | 30d | Evidence |");
        let _ = writeln!(out, "| --- | --- | ---: | --- |");
        for pick in missed.iter().take(10) {
            let evidence: String = pick
                .evidence
                .chars()
                .take(60)
                .collect::<String>()
                .replace('|', "/")
                .replace('\n', " ");
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                pick.meeting_date,
                pick.ticker,
                pct(pick.ret(30)),
                evidence
            );
        }
        let _ = writeln!(out);
    }

    let mut avoided: Vec<&&Pick> = priced
        .iter()
        .filter(|p| p.sentiment == Sentiment::Bearish && !p.acted_on)
        .collect();
    if !avoided.is_empty() {
        avoided.sort_by(|a, b| {
            a.ret(30)
                .partial_cmp(&b.ret(30))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let _ = writeln!(out, "### Correct Avoidances (bearish, untraded, worst 30d)");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Date | Ticker | 30d |");
        let _ = writeln!(out, "| --- | --- | ---: |");
        for pick in avoided.iter().take(10) {
            let _ = writeln!(
                out,
                "| {} | {} | {} |",
                pick.meeting_date,
                pick.ticker,
                pct(pick.ret(30))
            );
        }
        let _ = writeln!(out);
    }
}

fn frequency(out: &mut String, picks: &[Pick]) {
    let _ = writeln!(out, "## Discussion Frequency");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Ticker | Mentions | Bullish | Bearish | Avg 30d return |");
    let _ = writeln!(out, "| --- | ---: | ---: | ---: | ---: |");

    struct Tally {
        count: usize,
        bullish: usize,
        bearish: usize,
        returns: Vec<f64>,
    }
    let mut tallies: HashMap<&str, Tally> = HashMap::new();
    for pick in picks {
        let tally = tallies.entry(pick.ticker.as_str()).or_insert(Tally {
            count: 0,
            bullish: 0,
            bearish: 0,
            returns: Vec::new(),
        });
        tally.count += 1;
        match pick.sentiment {
            Sentiment::Bullish => tally.bullish += 1,
            Sentiment::Bearish => tally.bearish += 1,
            _ => {}
        }
        if let Some(r) = pick.ret(30) {
            tally.returns.push(r);
        }
    }
    let mut rows: Vec<(&str, Tally)> = tallies.into_iter().collect();
    rows.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.0.cmp(b.0)));
    for (ticker, tally) in rows.into_iter().take(20) {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            ticker,
            tally.count,
            tally.bullish,
            tally.bearish,
            pct(mean(&tally.returns))
        );
    }
    let _ = writeln!(out);
}

fn missing_data(out: &mut String, picks: &[Pick], windows: &[u32]) {
    let missing: Vec<&Pick> = picks
        .iter()
        .filter(|p| windows.iter().all(|w| p.ret(*w).is_none()))
        .collect();
    let _ = writeln!(out, "## Missing Data");
    let _ = writeln!(out);
    if missing.is_empty() {
        let _ = writeln!(out, "All picks were priced at every summary window.");
        let _ = writeln!(out);
        return;
    }
    let _ = writeln!(out, "{} mentions could not be priced:", missing.len());
    let _ = writeln!(out);
    for pick in missing.iter().take(30) {
        let _ = writeln!(
            out,
            "- {} {} (raw: {})",
            pick.meeting_date, pick.ticker, pick.ticker_raw
        );
    }
    if missing.len() > 30 {
        let _ = writeln!(out, "- ... and {} more", missing.len() - 30);
    }
    let _ = writeln!(out);
}

fn detail_table(out: &mut String, picks: &[Pick], windows: &[u32]) {
    let _ = writeln!(out, "## Full Detail");
    let _ = writeln!(out);
    let mut header = "| Date | Ticker | View | Acted |".to_string();
    let mut separator = "| --- | --- | --- | --- |".to_string();
    for w in windows {
        let _ = write!(header, " {}d |", w);
        separator.push_str(" ---: |");
    }
    header.push_str(" Group |");
    separator.push_str(" --- |");
    let _ = writeln!(out, "{}", header);
    let _ = writeln!(out, "{}", separator);

    let mut sorted: Vec<&Pick> = picks.iter().collect();
    sorted.sort_by(|a, b| {
        a.meeting_date
            .cmp(&b.meeting_date)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
    for pick in sorted {
        let mut row = format!(
            "| {} | {} | {} | {} |",
            pick.meeting_date,
            pick.ticker,
            sentiment_label(pick.sentiment),
            acted_label(pick)
        );
        for w in windows {
            let _ = write!(row, " {} |", pct(pick.ret(*w)));
        }
        let _ = write!(row, " {} |", Bucket::classify(pick).label());
        let _ = writeln!(out, "{}", row);
    }
    let _ = writeln!(out);
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Render the robustness follow-up report.
pub fn render_robustness(
    picks: &[Pick],
    meetings_count: usize,
    analyses: &RobustnessAnalyses,
    config: &RunConfig,
) -> String {
    let mut out = String::new();
    let unique_tickers: HashSet<&str> = picks.iter().map(|p| p.ticker.as_str()).collect();

    let _ = writeln!(out, "---");
    let _ = writeln!(out, "date: {}", config.as_of);
    let _ = writeln!(out, "type: backtest-robustness");
    let _ = writeln!(out, "meetings_analyzed: {}", meetings_count);
    let _ = writeln!(out, "unique_tickers: {}", unique_tickers.len());
    let _ = writeln!(out, "total_picks: {}", picks.len());
    let _ = writeln!(out, "---");
    let _ = writeln!(out);
    let _ = writeln!(out, "# Meeting Picks Backtest - Robustness Checks");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "> Six checks on whether the headline alpha is real and tradable: pipeline audit, concentration, cluster-robust inference, factor decomposition, cost sensitivity, and real P&L reconciliation."
    );
    let _ = writeln!(out);

    executive_summary(&mut out, analyses);
    audit_section(&mut out, &analyses.audit);
    concentration_section(&mut out, &analyses.concentration);
    let _ = writeln!(out, "## Cluster-Robust Inference");
    let _ = writeln!(out);
    bootstrap_section(&mut out, &analyses.bootstrap);
    newey_west_section(&mut out, &analyses.newey_west);
    factor_section(&mut out, &analyses.factors);
    cost_section(&mut out, &analyses.costs);
    pnl_section(&mut out, &analyses.pnl);
    scorecard(&mut out, analyses);

    out
}

fn executive_summary(out: &mut String, analyses: &RobustnessAnalyses) {
    let _ = writeln!(out, "## Executive Summary");
    let _ = writeln!(out);

    if let Ok(audit) = &analyses.audit {
        if let (Some(decay), Some(sim)) =
            (audit.decay_pool.mean_excess, audit.sim_pool.mean_excess)
        {
            let _ = writeln!(
                out,
                "- **Pipeline audit:** 90d excess differs by {} between the decay curve ({}) and the exit simulation ({}), driven by pool filtering (N={} vs {}).",
                pct2(Some(decay - sim)),
                pct2(Some(decay)),
                pct2(Some(sim)),
                audit.decay_pool.n,
                audit.sim_pool.n
            );
        }
    }

    if let Ok(stress) = &analyses.concentration {
        let baseline = stress.scenarios.first().and_then(|s| s.ba_excess_30);
        let worst = stress
            .scenarios
            .iter()
            .skip(1)
            .filter_map(|s| s.ba_excess_30.map(|e| (s.name.clone(), e)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        if let (Some(baseline), Some((name, worst))) = (baseline, worst) {
            let _ = writeln!(
                out,
                "- **Concentration:** worst exclusion is {} (30d excess {} from a {} baseline).",
                name,
                pct2(Some(worst)),
                pct2(Some(baseline))
            );
        }
    }

    if let Ok(boot) = &analyses.bootstrap {
        let _ = writeln!(
            out,
            "- **Clustering:** block bootstrap 95% CI [{}, {}]; zero {} the interval.",
            pct2(Some(boot.block_ci_95.0)),
            pct2(Some(boot.block_ci_95.1)),
            if boot.zero_in_ci_95 { "inside" } else { "outside" }
        );
    }

    if let Ok(nw) = &analyses.newey_west {
        let _ = writeln!(
            out,
            "- **Newey-West:** t = {:.2} ({}significant at 5%).",
            nw.t_nw,
            if nw.significant_5pct_nw { "" } else { "not " }
        );
    }

    if let Ok(factors) = &analyses.factors {
        if let Some(alpha) = factors.loading("Alpha") {
            let _ = writeln!(
                out,
                "- **Factors:** alpha {:.4} per period (t = {:.2}, {}significant), R-squared {:.1}%.",
                alpha.coef,
                alpha.t_stat,
                if alpha.significant_5pct { "" } else { "not " },
                factors.r_squared * 100.0
            );
        }
    }

    if let Ok(costs) = &analyses.costs {
        let _ = writeln!(out, "- **Costs:** breakeven at {:.0}bp round trip.", costs.breakeven_bps);
    }

    if let Ok(pnl) = &analyses.pnl {
        if let Some(diff) = pnl.mean_diff {
            let _ = writeln!(
                out,
                "- **P&L reconciliation:** realized vs theoretical differs by {} on average; correlation {}.",
                pct2(Some(diff)),
                num2(pnl.correlation)
            );
        }
    }
    let _ = writeln!(out);
}

fn audit_section(out: &mut String, result: &AnalysisResult<PipelineAudit>) {
    let _ = writeln!(out, "## Pipeline Audit");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "> Why the decay curve and the exit simulation report different 90d excess numbers."
    );
    let _ = writeln!(out);

    let audit = match result {
        Ok(a) => a,
        Err(e) => {
            let _ = writeln!(out, "*{}*", e);
            let _ = writeln!(out);
            return;
        }
    };

    let _ = writeln!(out, "| Module | N | 90d excess mean | 90d excess median |");
    let _ = writeln!(out, "| --- | ---: | ---: | ---: |");
    let _ = writeln!(
        out,
        "| Decay curve | {} | {} | {} |",
        audit.decay_pool.n,
        pct2(audit.decay_pool.mean_excess),
        pct2(audit.decay_pool.median_excess)
    );
    let _ = writeln!(
        out,
        "| Exit simulation | {} | {} | {} |",
        audit.sim_pool.n,
        pct2(audit.sim_pool.mean_excess),
        pct2(audit.sim_pool.median_excess)
    );
    let _ = writeln!(out, "| Simulation input pool | {} | - | - |", audit.sim_input_n);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "- Only in decay curve: **{}** picks (90d priced, 30d missing)",
        audit.only_in_decay
    );
    let _ = writeln!(
        out,
        "- Only in simulation: **{}** picks (30d priced, 90d missing)",
        audit.only_in_sim
    );
    let _ = writeln!(out, "- In both: **{}** picks", audit.common);
    let _ = writeln!(out);

    if !audit.discrepancies.is_empty() {
        let _ = writeln!(out, "### Largest Per-Pick Gaps");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Ticker | Date | Decay | Simulation | Diff |");
        let _ = writeln!(out, "| --- | --- | ---: | ---: | ---: |");
        for d in audit.discrepancies.iter().take(15) {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                d.ticker,
                d.meeting_date,
                pct2(Some(d.decay_excess)),
                pct2(Some(d.sim_excess)),
                pct2(Some(d.diff))
            );
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "> {}", audit.root_cause);
    let _ = writeln!(out);
}

fn concentration_section(out: &mut String, result: &AnalysisResult<ConcentrationStress>) {
    let _ = writeln!(out, "## Concentration Stress Test");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "> Does the alpha survive without the biggest single winners?"
    );
    let _ = writeln!(out);

    let stress = match result {
        Ok(s) => s,
        Err(e) => {
            let _ = writeln!(out, "*{}*", e);
            let _ = writeln!(out);
            return;
        }
    };

    if !stress.top_contributors.is_empty() {
        let _ = writeln!(out, "Top contributors: **{}**", stress.top_contributors.join(", "));
        let _ = writeln!(out);
    }
    let _ = writeln!(
        out,
        "| Scenario | N | 30d excess | 30d beat rate | 90d excess | Placebo pctile | Excess Sharpe |"
    );
    let _ = writeln!(out, "| --- | ---: | ---: | ---: | ---: | ---: | ---: |");
    for scenario in &stress.scenarios {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} |",
            scenario.name,
            scenario.n_bullish_acted,
            pct2(scenario.ba_excess_30),
            rate(scenario.ba_win_rate_30),
            pct2(scenario.ba_excess_90),
            match scenario.bootstrap_percentile {
                Some(p) => format!("{:.0}%", p),
                None => "N/A".to_string(),
            },
            num2(scenario.excess_sharpe)
        );
    }
    let _ = writeln!(out);
    if stress.fragile {
        let _ = writeln!(
            out,
            "> **Warning:** removing key names eliminates most of the excess return. The aggregate alpha rests on a handful of outsized winners."
        );
    } else {
        let _ = writeln!(
            out,
            "> Alpha is reasonably robust to single-name exclusion: no one ticker carries the result."
        );
    }
    let _ = writeln!(out);
}

fn factor_section(out: &mut String, result: &AnalysisResult<FactorRegression>) {
    let _ = writeln!(out, "## Factor Regression");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "> Basket returns regressed on ETF-proxy factors: market, size, value, momentum. The intercept is what stock selection adds after exposures."
    );
    let _ = writeln!(out);

    let factors = match result {
        Ok(f) => f,
        Err(e) => {
            let _ = writeln!(out, "*{}*", e);
            let _ = writeln!(out);
            return;
        }
    };

    let _ = writeln!(
        out,
        "Observations: **{}** meetings ({} to {})",
        factors.n_observations, factors.first_date, factors.last_date
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "| Factor | Coefficient | SE | t | Significant (5%) |");
    let _ = writeln!(out, "| --- | ---: | ---: | ---: | --- |");
    for loading in &factors.loadings {
        let _ = writeln!(
            out,
            "| {} | {:.4} | {:.4} | {:.2} | {} |",
            loading.name,
            loading.coef,
            loading.se,
            loading.t_stat,
            yes_no(loading.significant_5pct)
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "- **Annualized alpha:** {}", pct(Some(factors.ann_alpha)));
    let _ = writeln!(out, "- **R-squared:** {:.1}%", factors.r_squared * 100.0);
    let _ = writeln!(out, "- **Adjusted R-squared:** {:.1}%", factors.adj_r_squared * 100.0);
    let _ = writeln!(out, "- **Residual std:** {:.3}", factors.residual_std);
    let _ = writeln!(out);
}

fn cost_section(out: &mut String, result: &AnalysisResult<CostSensitivity>) {
    let _ = writeln!(out, "## Transaction Cost Sensitivity");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "> Excess returns under round-trip cost assumptions. Alpha that dies at realistic costs is not tradable."
    );
    let _ = writeln!(out);

    let costs = match result {
        Ok(c) => c,
        Err(e) => {
            let _ = writeln!(out, "*{}*", e);
            let _ = writeln!(out);
            return;
        }
    };

    let _ = writeln!(out, "Sample: **{}** bullish+acted picks", costs.n);
    let _ = writeln!(out);
    let _ = writeln!(out, "| Scenario | 30d excess | Beat rate | Sharpe | Reduction |");
    let _ = writeln!(out, "| --- | ---: | ---: | ---: | ---: |");
    let _ = writeln!(
        out,
        "| No costs | {} | {} | - | - |",
        pct2(Some(costs.baseline_mean_excess)),
        rate(Some(costs.baseline_win_rate))
    );
    for scenario in &costs.scenarios {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            scenario.scenario.label(),
            pct2(scenario.mean_excess),
            rate(scenario.win_rate),
            num2(scenario.sharpe),
            pct2(scenario.excess_reduction)
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "### Breakeven: **{:.0}bp**", costs.breakeven_bps);
    let _ = writeln!(out);
    if costs.breakeven_bps > 30.0 {
        let _ = writeln!(
            out,
            "> Breakeven sits above typical institutional round-trip costs (5-30bp); the signal likely survives execution."
        );
    } else if costs.breakeven_bps > 10.0 {
        let _ = writeln!(
            out,
            "> Breakeven is inside the realistic cost range for non-US names; tradability is marginal."
        );
    } else {
        let _ = writeln!(out, "> Costs of {}bp erase the alpha; the signal is not tradable.", costs.breakeven_bps.round());
    }
    let _ = writeln!(out);

    if !costs.tiered_distribution.is_empty() {
        let _ = writeln!(out, "Tiered cost distribution:");
        for (bps, count) in &costs.tiered_distribution {
            let _ = writeln!(out, "- {}bp: {} picks", bps, count);
        }
        let _ = writeln!(out);
    }
}

fn pnl_section(out: &mut String, result: &AnalysisResult<PnlReconciliation>) {
    let _ = writeln!(out, "## Real P&L Reconciliation");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "> Backtest picks matched to actual ledger fills: realized return, entry slippage and commission drag vs the theoretical figure."
    );
    let _ = writeln!(out);

    let pnl = match result {
        Ok(p) => p,
        Err(e) => {
            let _ = writeln!(out, "*{}*", e);
            let _ = writeln!(out);
            return;
        }
    };

    let _ = writeln!(out, "- Matched to fills: **{}**", pnl.n_matched);
    let _ = writeln!(out, "- Comparable both ways: **{}**", pnl.n_with_both_returns);
    let _ = writeln!(out, "- Unmatched: **{}**", pnl.n_unmatched);
    let _ = writeln!(out);

    if pnl.n_with_both_returns > 0 {
        let _ = writeln!(out, "| Metric | Value |");
        let _ = writeln!(out, "| --- | ---: |");
        let _ = writeln!(
            out,
            "| Mean theoretical return | {} |",
            pct2(pnl.mean_backtest_return)
        );
        let _ = writeln!(out, "| Mean realized return | {} |", pct2(pnl.mean_actual_return));
        let _ = writeln!(out, "| Mean diff (realized - theoretical) | {} |", pct2(pnl.mean_diff));
        let _ = writeln!(out, "| Median diff | {} |", pct2(pnl.median_diff));
        let _ = writeln!(out, "| Mean entry slippage | {} |", pct2(pnl.mean_slippage));
        let _ = writeln!(
            out,
            "| Mean commission | {} |",
            match pnl.mean_commission_bps {
                Some(bps) => format!("{:.1}bp", bps),
                None => "N/A".to_string(),
            }
        );
        let _ = writeln!(out, "| Correlation | {} |", num2(pnl.correlation));
        let _ = writeln!(out);
    }

    if !pnl.matched.is_empty() {
        let _ = writeln!(out, "### Largest Gaps (|realized - theoretical|)");
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "| Ticker | Meeting | Theoretical | Realized | Diff | Slippage | Commission |"
        );
        let _ = writeln!(out, "| --- | --- | ---: | ---: | ---: | ---: | ---: |");
        for m in pnl.matched.iter().take(20) {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} | {} |",
                m.ticker,
                m.meeting_date,
                pct(Some(m.backtest_return)),
                pct(m.actual_return),
                pct(m.diff),
                pct2(m.slippage),
                format!("{:.0}bp", m.commission_bps)
            );
        }
        let _ = writeln!(out);
    }

    if !pnl.unmatched.is_empty() {
        let _ = writeln!(out, "### Unmatched Picks");
        let _ = writeln!(out);
        for u in pnl.unmatched.iter().take(10) {
            let _ = writeln!(
                out,
                "- {} {} (theoretical 30d: {})",
                u.meeting_date,
                u.ticker,
                pct(Some(u.backtest_return))
            );
        }
        if pnl.unmatched.len() > 10 {
            let _ = writeln!(out, "- ... and {} more", pnl.unmatched.len() - 10);
        }
        let _ = writeln!(out);
    }
}

fn scorecard(out: &mut String, analyses: &RobustnessAnalyses) {
    let _ = writeln!(out, "## Scorecard");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Check | Verdict |");
    let _ = writeln!(out, "| --- | --- |");

    let mut verdicts: Vec<&str> = Vec::new();
    let mut add = |out: &mut String, label: &str, verdict: Option<&'static str>| {
        let text = verdict.unwrap_or("N/A");
        let _ = writeln!(out, "| {} | {} |", label, text);
        if let Some(v) = verdict {
            verdicts.push(v);
        }
    };

    let concentration = analyses.concentration.as_ref().ok().map(|stress| {
        let baseline = stress.scenarios.first().and_then(|s| s.ba_excess_30).unwrap_or(0.0);
        let min = stress
            .scenarios
            .iter()
            .skip(1)
            .filter_map(|s| s.ba_excess_30)
            .fold(f64::INFINITY, f64::min);
        if min.is_finite() && min > baseline * 0.5 {
            "PASS"
        } else if min.is_finite() && min > 0.0 {
            "WEAK"
        } else {
            "FAIL"
        }
    });
    add(out, "Concentration robustness", concentration);

    let significance = analyses.bootstrap.as_ref().ok().map(|boot| {
        if !boot.zero_in_ci_95 {
            "PASS"
        } else if !boot.zero_in_ci_90 {
            "WEAK"
        } else {
            "FAIL"
        }
    });
    add(out, "Block bootstrap significance", significance);

    let nw = analyses.newey_west.as_ref().ok().map(|nw| {
        if nw.significant_5pct_nw {
            "PASS"
        } else if nw.significant_10pct_nw {
            "WEAK"
        } else {
            "FAIL"
        }
    });
    add(out, "Newey-West significance", nw);

    let alpha = analyses.factors.as_ref().ok().and_then(|f| f.loading("Alpha")).map(|alpha| {
        if alpha.significant_5pct && alpha.coef > 0.0 {
            "PASS"
        } else if alpha.coef > 0.0 {
            "WEAK"
        } else {
            "FAIL"
        }
    });
    add(out, "Factor-adjusted alpha", alpha);

    let cost = analyses.costs.as_ref().ok().map(|costs| {
        if costs.breakeven_bps > 30.0 {
            "PASS"
        } else if costs.breakeven_bps > 15.0 {
            "WEAK"
        } else {
            "FAIL"
        }
    });
    add(out, "Cost viability", cost);

    let _ = writeln!(out);
    let passes = verdicts.iter().filter(|v| **v == "PASS").count();
    let weaks = verdicts.iter().filter(|v| **v == "WEAK").count();
    let fails = verdicts.iter().filter(|v| **v == "FAIL").count();
    let total = verdicts.len();
    if total == 0 {
        let _ = writeln!(out, "*insufficient data: no checks could run*");
    } else if passes * 10 >= total * 6 {
        let _ = writeln!(
            out,
            "> **Overall:** {}/{} checks pass ({} weak, {} fail). The selection signal carries real alpha, with concentration and significance worth monitoring.",
            passes, total, weaks, fails
        );
    } else if fails * 10 >= total * 6 {
        let _ = writeln!(
            out,
            "> **Overall:** {}/{} checks fail. The headline alpha most likely reflects luck, concentration, or factor exposure rather than selection skill.",
            fails, total
        );
    } else {
        let _ = writeln!(
            out,
            "> **Overall:** mixed ({} pass / {} weak / {} fail). The signal exists but is not robust; collect more data and re-test.",
            passes, weaks, fails
        );
    }
    let _ = writeln!(out);
}
