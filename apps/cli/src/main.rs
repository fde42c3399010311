#![deny(warnings)]

//! Headless CLI: carbon report, what-if steps and a valuation run for one session.

use anyhow::{anyhow, bail, Context, Result};
use carbon_accounting::{breakdown, comparison};
use carbon_core::{Persona, MAX_EDITABLE_VOLUME};
use oracles::{GenAiClient, GenAiConfig, GenAiOptimizer, GenAiValuer, OfflineOptimizer, OfflineValuer, OfflineValuerConfig};
use rust_decimal::Decimal;
use scenario::OptimizationOracle;
use serde::Deserialize;
use session::{Session, SessionConfig};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;
use valuation::{Headline, ValuationOracle};

/// Optional YAML run file; every field can also be given as a flag.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunFile {
    floor_area: Option<Decimal>,
    volumes: BTreeMap<String, Decimal>,
    import_seed: Option<u64>,
    what_if: Vec<String>,
    persona: Option<String>,
    lifespan_years: Option<u32>,
    holding_period_years: Option<u32>,
    location: Option<String>,
    offline: bool,
}

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    area: Option<Decimal>,
    set: Vec<(String, Decimal)>,
    import_seed: Option<u64>,
    what_if: Vec<String>,
    persona: Option<Persona>,
    lifespan: Option<u32>,
    holding: Option<u32>,
    location: Option<String>,
    offline: bool,
}

fn value(flag: &str, v: Option<String>) -> Result<String> {
    v.ok_or_else(|| anyhow!("{flag} needs a value"))
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut out = Args::default();
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => out.config = Some(PathBuf::from(value(&arg, it.next())?)),
            "--area" => out.area = Some(value(&arg, it.next())?.parse().context("--area")?),
            "--set" => {
                let raw = value(&arg, it.next())?;
                let (name, vol) = raw
                    .rsplit_once('=')
                    .ok_or_else(|| anyhow!("--set expects NAME=VOLUME, got {raw}"))?;
                out.set.push((name.to_string(), vol.parse().context("--set volume")?));
            }
            "--import-seed" => out.import_seed = Some(value(&arg, it.next())?.parse().context("--import-seed")?),
            "--what-if" => out.what_if.push(value(&arg, it.next())?),
            "--persona" => out.persona = Some(value(&arg, it.next())?.parse()?),
            "--lifespan" => out.lifespan = Some(value(&arg, it.next())?.parse().context("--lifespan")?),
            "--holding" => out.holding = Some(value(&arg, it.next())?.parse().context("--holding")?),
            "--location" => out.location = Some(value(&arg, it.next())?),
            "--offline" => out.offline = true,
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(out)
}

/// Merged run settings; flags win over the run file.
#[derive(Debug, PartialEq)]
struct Plan {
    floor_area: Decimal,
    volumes: Vec<(String, Decimal)>,
    import_seed: Option<u64>,
    what_if: Vec<String>,
    persona: Persona,
    lifespan: u32,
    holding: u32,
    location: String,
    offline: bool,
}

fn plan(args: Args, file: RunFile) -> Result<Plan> {
    let file_persona = file.persona.as_deref().map(str::parse::<Persona>).transpose()?;
    let mut volumes: Vec<(String, Decimal)> = file.volumes.into_iter().collect();
    volumes.extend(args.set);
    let mut what_if = file.what_if;
    what_if.extend(args.what_if);
    Ok(Plan {
        floor_area: args
            .area
            .or(file.floor_area)
            .unwrap_or_else(|| SessionConfig::default().floor_area),
        volumes,
        import_seed: args.import_seed.or(file.import_seed),
        what_if,
        persona: args.persona.or(file_persona).unwrap_or(Persona::InvestmentManager),
        lifespan: args.lifespan.or(file.lifespan_years).unwrap_or(60),
        holding: args.holding.or(file.holding_period_years).unwrap_or(15),
        location: args
            .location
            .or(file.location)
            .unwrap_or_else(|| "London, UK".to_string()),
        offline: args.offline || file.offline,
    })
}

fn load_run_file(path: Option<&PathBuf>) -> Result<RunFile> {
    let Some(path) = path else {
        return Ok(RunFile::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn pick_oracles(offline: bool, as_of_year: i32) -> (Box<dyn OptimizationOracle>, Box<dyn ValuationOracle>) {
    if let Some(cfg) = GenAiConfig::from_env().filter(|_| !offline) {
        info!(model = %cfg.model, "using hosted oracles");
        let client = GenAiClient::new(cfg);
        let optimizer: Box<dyn OptimizationOracle> = Box::new(GenAiOptimizer::new(client.clone()));
        let valuer: Box<dyn ValuationOracle> = Box::new(GenAiValuer::new(client));
        return (optimizer, valuer);
    }
    info!("using offline oracles");
    let optimizer: Box<dyn OptimizationOracle> = Box::new(OfflineOptimizer::new());
    let valuer: Box<dyn ValuationOracle> = Box::new(OfflineValuer::new(OfflineValuerConfig::new(as_of_year)));
    (optimizer, valuer)
}

fn print_carbon(session: &Session) -> Result<()> {
    let snap = session.carbon()?;
    println!(
        "Carbon | total: {:.1} tCO2e | intensity: {} kgCO2e/m2 | {} | largest: {}",
        snap.total_carbon / Decimal::ONE_THOUSAND,
        snap.carbon_per_area.round_dp(1),
        snap.class.label(),
        snap.dominant.as_deref().unwrap_or("-")
    );
    for share in breakdown(session.ledger().materials())? {
        println!("  {:<24} {:>8} m3 {:>10.1} tCO2e", share.name, share.volume, share.carbon / Decimal::ONE_THOUSAND);
    }
    for row in comparison(snap.carbon_per_area, &session.config().benchmarks) {
        println!("  {:<24} {:>8} kgCO2e/m2", row.label, row.carbon_per_area);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    let file = load_run_file(args.config.as_ref())?;
    let plan = plan(args, file)?;
    info!(?plan, "starting CLI");

    let mut session = Session::new(SessionConfig {
        floor_area: plan.floor_area,
        ..SessionConfig::default()
    })?;
    if let Some(seed) = plan.import_seed {
        session.import_geometry(seed)?;
    }
    for (name, volume) in &plan.volumes {
        let clamped = (*volume).clamp(Decimal::ZERO, MAX_EDITABLE_VOLUME);
        if clamped != *volume {
            warn!(material = %name, requested = %volume, applied = %clamped, "volume clamped to editor range");
        }
        session.set_volume(name, clamped)?;
    }
    print_carbon(&session)?;

    let (optimizer, valuer) = pick_oracles(plan.offline, session.config().as_of_year);

    if !plan.what_if.is_empty() {
        session.start_what_if()?;
        for instruction in &plan.what_if {
            match session.optimize(optimizer.as_ref(), instruction).await {
                Ok(step) => println!(
                    "What-if #{} | carbon: {:.1} tCO2e | cost delta: {}",
                    step.index,
                    step.total_carbon / Decimal::ONE_THOUSAND,
                    step.cost_delta.round_dp(0)
                ),
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, instruction = %instruction, "what-if step failed; try again");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
            if let Some(outcome) = session.trajectory()?.last_outcome() {
                println!(
                    "  oracle estimate: {} carbon, {:+.1}% cost | {}",
                    fmt_reduction(outcome.carbon_reduction_percent),
                    outcome.cost_delta_percent,
                    outcome.explanation
                );
            }
        }
    }

    let params = session.asset_parameters(plan.lifespan, plan.holding, &plan.location)?;
    match session.run_analysis(valuer.as_ref(), params, plan.persona).await {
        Ok(report) => {
            println!(
                "Valuation | {} | risk: {:?} | report: {:?} | stranded: {}",
                plan.persona,
                report.risk_rating,
                report.report_type,
                report
                    .stranded_year
                    .map(|y| y.to_string())
                    .unwrap_or_else(|| "never".to_string())
            );
            for point in &report.npv_series {
                println!("  {} NPV {}", point.year, point.value.round_dp(0));
            }
            for row in &report.sensitivity_table {
                println!("  carbon price {} -> value -{:.1}%", row.carbon_price_increase_label, row.valuation_drop_percent);
            }
            for line in &report.advice {
                println!("  * {line}");
            }
        }
        Err(e) if e.is_retryable() => warn!(error = %e, "valuation failed; try again"),
        Err(e) => return Err(e.into()),
    }
    match session.valuation().headline() {
        Some(Headline::LiquidityVelocity { boost_percent }) => {
            println!("Headline | Liquidity velocity: {}", fmt_pct(boost_percent, "+"))
        }
        Some(Headline::ValueAtRisk { drop_percent }) => {
            println!("Headline | Value at risk: {}", fmt_pct(drop_percent, "-"))
        }
        None => {}
    }
    Ok(())
}

fn fmt_pct(v: Option<f32>, sign: &str) -> String {
    v.map(|p| format!("{sign}{p:.1}%")).unwrap_or_else(|| "n/a".to_string())
}

/// A reduction shown as a signed change: 12.5 prints as "-12.5%", -3 as "+3.0%".
fn fmt_reduction(reduction_percent: f32) -> String {
    format!("{:+.1}%", 0.0 - reduction_percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_repeated_and_keyed_flags() {
        let a = args(&[
            "--area", "2500", "--set", "Steel (Rebar)=25", "--what-if", "Replace 20% steel with timber",
            "--what-if", "Reduce concrete by 10%", "--persona", "developer", "--offline",
        ])
        .unwrap();
        assert_eq!(a.area, Some(Decimal::new(2500, 0)));
        assert_eq!(a.set, vec![("Steel (Rebar)".to_string(), Decimal::new(25, 0))]);
        assert_eq!(a.what_if.len(), 2);
        assert_eq!(a.persona, Some(Persona::RealEstateDeveloper));
        assert!(a.offline);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(args(&["--area"]).is_err());
        assert!(args(&["--set", "Brick"]).is_err());
        assert!(args(&["--persona", "landlord"]).is_err());
        assert!(args(&["--frobnicate"]).is_err());
    }

    #[test]
    fn reduction_prints_with_one_sign() {
        assert_eq!(fmt_reduction(12.5), "-12.5%");
        assert_eq!(fmt_reduction(-3.0), "+3.0%");
    }

    #[test]
    fn flags_override_run_file() {
        let file: RunFile = serde_yaml::from_str(
            "floor_area: 1200\npersona: Compliance Officer\nholding_period_years: 10\nvolumes:\n  Brick: 90\nwhat_if:\n  - Reduce brick by 5%\n",
        )
        .unwrap();
        let a = args(&["--holding", "20", "--what-if", "Replace 10% steel with timber"]).unwrap();
        let p = plan(a, file).unwrap();
        assert_eq!(p.floor_area, Decimal::new(1200, 0));
        assert_eq!(p.persona, Persona::ComplianceOfficer);
        assert_eq!(p.holding, 20);
        assert_eq!(p.lifespan, 60);
        assert_eq!(p.volumes, vec![("Brick".to_string(), Decimal::new(90, 0))]);
        assert_eq!(p.what_if, vec!["Reduce brick by 5%", "Replace 10% steel with timber"]);
        assert!(!p.offline);
    }
}
