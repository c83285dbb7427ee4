//! Integration tests for Offgrid search
//!
//! These tests drive the public API end to end, from a free-text query to
//! ranked results, against the synthetic worlds of `offgrid::data::test_data`.

use std::{sync::Arc, time::Duration};

use offgrid::{
    CancelToken, EndMarker, Engine, Mode, OffgridError, Processor, Results, SearchConfig,
    SearchConfigBuilder, SearchContext, SearchParams,
    data::{
        FeatureRef,
        geometry::{Point, rect_around},
        test_data::{MOSCOW, SPRINGFIELD, TestWorld},
    },
    model::SearchType,
    ranking::ResultKind,
};

fn setup_test_env() {
    let _ = offgrid::init_logging(tracing::Level::WARN);
}

fn sample_processor() -> (TestWorld, Processor) {
    setup_test_env();
    let ctx = SearchContext::try_from(TestWorld::sample().expect("Should build world"))
        .expect("Should build context");
    (
        TestWorld::sample().expect("Should build world"),
        Processor::new(Arc::new(ctx), SearchConfig::default()),
    )
}

fn springfield(query: &str) -> SearchParams {
    SearchParams::new(
        query,
        rect_around(Point::new(SPRINGFIELD.0, SPRINGFIELD.1), 2_000.0),
    )
}

fn run(processor: &mut Processor, params: &SearchParams) -> Results {
    processor.search(params, &CancelToken::default(), &mut |_| {})
}

fn position(results: &Results, id: FeatureRef) -> Option<usize> {
    results.iter().position(|r| r.feature == Some(id))
}

#[test]
fn test_street_query() {
    let (world, mut p) = sample_processor();
    let street = world.find_named("Main Street").unwrap();
    let results = run(&mut p, &springfield("Main Street"));
    assert_eq!(results.end, Some(EndMarker::Finished));
    assert_eq!(position(&results, street), Some(0));
    assert_eq!(results.items[0].name, "Main Street");
    assert_eq!(results.items[0].search_type, Some(SearchType::Street));
}

#[test]
fn test_house_number_query() {
    let (world, mut p) = sample_processor();
    let house = world.find_house("Main Street", "2").unwrap();
    let results = run(&mut p, &springfield("Main Street 2"));
    assert_eq!(position(&results, house), Some(0));
    assert_eq!(results.items[0].address, "Main Street, 2, Springfield, Testland");
}

#[test]
fn test_poi_and_city_queries() {
    let (world, mut p) = sample_processor();

    let cafe = world.find_named("Blue Cafe").unwrap();
    let results = run(&mut p, &springfield("Blue Cafe"));
    assert_eq!(position(&results, cafe), Some(0));
    // Both tokens are highlighted in the name.
    assert_eq!(results.items[0].highlights, vec![0..4, 5..9]);

    let city = world.find_named("Springfield").unwrap();
    let results = run(&mut p, &springfield("Springfield"));
    assert_eq!(position(&results, city), Some(0));
    assert_eq!(results.items[0].search_type, Some(SearchType::City));
}

#[test]
fn test_interpolated_house_numbers() {
    let (_, mut p) = sample_processor();
    let results = run(&mut p, &springfield("Long Road 3700"));
    assert!(
        results
            .iter()
            .any(|r| r.search_type == Some(SearchType::Building)),
        "Even interpolation should cover 3700"
    );

    let results = run(&mut p, &springfield("Long Road 3701"));
    assert!(
        !results
            .iter()
            .any(|r| r.search_type == Some(SearchType::Building)),
        "Even interpolation should not cover 3701"
    );
}

#[test]
fn test_category_query() {
    let (world, mut p) = sample_processor();
    let cafe = world.find_named("Blue Cafe").unwrap();
    let results = run(&mut p, &springfield("cafe "));
    assert!(position(&results, cafe).is_some());
    assert!(
        results
            .iter()
            .all(|r| r.search_type == Some(SearchType::SubPoi))
    );
}

#[test]
fn test_unclassified_feature_query() {
    let (world, mut p) = sample_processor();
    let park = world.find_named("Green Park").unwrap();
    let results = run(&mut p, &springfield("Green Park"));
    assert!(position(&results, park).is_some());
}

#[test]
fn test_village_queries() {
    let (world, mut p) = sample_processor();
    let village = world.find_named("Little Hamlet").unwrap();
    let results = run(&mut p, &springfield("Little Hamlet"));
    assert!(position(&results, village).is_some());

    let lane = world.find_named("Church Lane").unwrap();
    let results = run(&mut p, &springfield("Church Lane Little Hamlet"));
    assert_eq!(position(&results, lane), Some(0));
}

#[test]
fn test_country_query() {
    let (world, mut p) = sample_processor();
    let country = world.find_named("Testland").unwrap();
    let results = run(&mut p, &springfield("Testland"));
    assert_eq!(position(&results, country), Some(0));
    assert_eq!(results.items[0].search_type, Some(SearchType::Country));
}

#[test]
fn test_search_modes() {
    let (world, mut p) = sample_processor();
    let far = world.find_named("Village Cafe").unwrap();

    let results = run(&mut p, &springfield("cafe ").with_mode(Mode::Viewport));
    assert!(!results.is_empty());
    assert_eq!(position(&results, far), None);

    let results = run(
        &mut p,
        &springfield("Main Street Springfield").with_mode(Mode::Downloader),
    );
    assert!(
        results
            .iter()
            .all(|r| r.search_type.is_some_and(|t| t.is_locality()))
    );

    let results = run(&mut p, &springfield("Main Street").with_mode(Mode::Bookmarks));
    assert!(results.is_empty());
    assert_eq!(results.end, Some(EndMarker::Finished));
}

#[test]
fn test_coordinates_and_empty_queries() {
    let (_, mut p) = sample_processor();
    let results = run(&mut p, &springfield("50.01, 10.02"));
    assert_eq!(results.len(), 1);
    assert_eq!(results.items[0].kind, ResultKind::LatLon);

    let results = run(&mut p, &springfield(""));
    assert!(results.is_empty());
    assert_eq!(results.end, Some(EndMarker::Finished));
}

#[test]
fn test_cancellation() {
    let (_, mut p) = sample_processor();
    let cancel = CancelToken::default();
    cancel.cancel();
    let results = p.search(&springfield("Main Street"), &cancel, &mut |_| {});
    assert!(results.is_cancelled());

    let cancel = CancelToken::new(Some(Duration::ZERO), false);
    let results = p.search(&springfield("Main Street"), &cancel, &mut |_| {});
    assert!(results.is_cancelled());
    assert!(results.incomplete);
}

#[test]
fn test_house_wins_over_numbered_streets() {
    setup_test_env();
    let world = TestWorld::moscow().expect("Should build world");
    let ctx = SearchContext::try_from(TestWorld::moscow().unwrap()).unwrap();
    let mut p = Processor::new(Arc::new(ctx), SearchConfig::default());
    let viewport = rect_around(Point::new(MOSCOW.0, MOSCOW.1), 3_000.0);

    let arbat_house = world.find_house("улица Арбат", "2").unwrap();
    let numbered_street = world.find_named("2-й Обыденский переулок").unwrap();
    let results = run(
        &mut p,
        &SearchParams::new("Арбат 2", viewport).with_locale("ru"),
    );
    let house = position(&results, arbat_house).expect("Should find Arbat 2");
    assert!(position(&results, numbered_street).is_none_or(|street| house < street));

    let house_on_numbered = world.find_house("2-й Обыденский переулок", "2").unwrap();
    let results = run(
        &mut p,
        &SearchParams::new("2-й Обыденский переулок 2", viewport).with_locale("ru"),
    );
    let house = position(&results, house_on_numbered).expect("Should find the house");
    assert!(position(&results, numbered_street).is_none_or(|street| house < street));
}

#[test]
fn test_engine_workflow() {
    setup_test_env();
    let ctx = Arc::new(SearchContext::try_from(TestWorld::sample().unwrap()).unwrap());
    let config = SearchConfigBuilder::fast().threads(2).build();
    let mut engine = Engine::new(ctx, config).expect("Should start engine");

    // 1. Plain query
    let results = engine
        .search(springfield("Blue Cafe"))
        .expect("Search should be queued")
        .wait();
    assert_eq!(results.items[0].name, "Blue Cafe");

    // 2. Streamed query: the last snapshot is the final one
    let (tx, rx) = std::sync::mpsc::channel();
    let results = engine
        .search_with_callback(springfield("Main Street"), move |r| {
            let _ = tx.send(r.is_end());
        })
        .unwrap()
        .wait();
    let ends: Vec<bool> = rx.try_iter().collect();
    assert_eq!(ends.last(), Some(&true));
    assert_eq!(ends.iter().filter(|e| **e).count(), 1);
    assert!(results.is_end());

    // 3. Settings changes reach every thread
    engine.set_locale("de").unwrap();
    for _ in 0..3 {
        let results = engine.search(springfield("Testland ")).unwrap().wait();
        assert_eq!(results.items[0].name, "Testreich");
    }

    // 4. Shut down
    engine.shutdown();
    assert!(matches!(
        engine.search(springfield("Blue Cafe")),
        Err(OffgridError::EngineShutDown)
    ));
}
