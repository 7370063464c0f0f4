use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ledgerd::query;
use ledgerd::store::{Criteria, Record, Store, TRAFFIC_SLOTS};

fn sample_record(i: usize) -> Record {
    Record::new(
        format!("Subscriber {i}"),
        format!("10.0.{}.{}", i / 256, i % 256).parse().unwrap(),
        "01.01.2023".parse().unwrap(),
        &[1.0; TRAFFIC_SLOTS],
        &[0.5; TRAFFIC_SLOTS],
    )
    .unwrap()
}

fn parse_add(c: &mut Criterion) {
    let query = r#"ADD FIO "Ivanov I.I." IP 192.168.1.1 DATE 01.01.2023 TRAFFIC_IN 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20 21 22 23 24 TRAFFIC_OUT 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20 21 22 23 24 END"#;
    c.bench_function("parse ADD with traffic blocks", |b| {
        b.iter(|| query::parse(black_box(query)).unwrap())
    });
}

fn find_by_criteria_over_1000_records(c: &mut Criterion) {
    let mut store = Store::default();
    for i in 0..1000 {
        store.add_record(sample_record(i));
    }
    let criteria = Criteria {
        name: Some("Subscriber 999".to_string()),
        ..Default::default()
    };

    c.bench_function("find_by_criteria over 1000 records", |b| {
        b.iter(|| black_box(store.find_by_criteria(&criteria)))
    });
}

criterion_group!(benches, parse_add, find_by_criteria_over_1000_records);
criterion_main!(benches);
