// Filter Application Pass benchmarks
//
// One pass over a synthetic poster grid, cold (every matching tile is
// treated) and warm (everything already processed, the common idle case).

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use serde_json::{json, Value};

use fbx_core::dom::memory::MemoryDom;
use fbx_core::store::keys;
use fbx_core::{apply_filters, AppContext, FilterStore, MemoryStore};

fn poster_grid(tiles: usize) -> String {
    let mut html = String::from(r#"<ul class="poster-list">"#);
    for id in 0..tiles {
        html.push_str(&format!(
            r#"<li class="poster-container"><div class="film-poster" data-film-id="{id}" data-film-slug="film-{id}"><img src="{id}.jpg"></div></li>"#
        ));
    }
    html.push_str("</ul>");
    html
}

fn filter_list(films: usize) -> Value {
    let entries: Vec<Value> = (0..films)
        .map(|id| json!({ "id": id * 3, "slug": format!("film-{}", id * 3), "name": format!("Film {id}") }))
        .collect();
    Value::Array(entries)
}

fn context(tiles: usize, films: usize) -> AppContext<MemoryDom, MemoryStore> {
    let store = MemoryStore::new().with_value(keys::FILM_FILTER, filter_list(films));
    AppContext::new(MemoryDom::from_html(&poster_grid(tiles)), FilterStore::new(store))
}

fn bench_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("pass");

    for &(tiles, films) in &[(60, 10), (240, 40)] {
        let label = format!("{tiles}x{films}");

        group.bench_with_input(BenchmarkId::new("cold", &label), &(tiles, films), |b, &(tiles, films)| {
            b.iter_batched(
                || context(tiles, films),
                |ctx| black_box(apply_filters(&ctx)),
                BatchSize::SmallInput,
            )
        });

        let warm = context(tiles, films);
        apply_filters(&warm);
        group.bench_with_input(BenchmarkId::new("warm", &label), &warm, |b, ctx| {
            b.iter(|| black_box(apply_filters(ctx)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pass);
criterion_main!(benches);
