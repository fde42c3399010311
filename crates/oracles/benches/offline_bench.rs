use carbon_core::{AssetParameters, Persona};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use oracles::{OfflineValuer, OfflineValuerConfig};
use rust_decimal::Decimal;
use valuation::ValuationRequest;

fn bench_projection(c: &mut Criterion) {
    let valuer = OfflineValuer::new(OfflineValuerConfig::new(2026));
    let request = ValuationRequest {
        params: AssetParameters {
            lifespan_years: 120,
            holding_period_years: 100,
            total_carbon: Decimal::new(958_750, 0),
            floor_area: Decimal::new(1000, 0),
            location: "London, UK".to_string(),
        },
        persona: Persona::InvestmentManager,
    };
    c.bench_function("offline valuation 100y", |b| {
        b.iter(|| black_box(valuer.project(black_box(&request))))
    });
}

criterion_group!(benches, bench_projection);
criterion_main!(benches);
