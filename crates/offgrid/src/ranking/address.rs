//! Address lines of results: street and house number, the containing
//! locality and the country.

use offgrid_data::{
    Feature, FeatureRef, ReverseGeocoder,
    geometry::{Point, distance_m, rect_around},
};

use crate::{
    context::SearchContext,
    model::{SearchType, locality_radius_m},
    ranking::display::display_name,
};

/// No city or village is larger than this.
const MAX_LOCALITY_RADIUS_M: f64 = 60_000.0;
/// POIs take the address of a street at most this far away.
const POI_STREET_RADIUS_M: f64 = 100.0;

/// The city whose boundary contains `p`, else the nearest city or village
/// whose population radius covers `p`.
pub fn find_locality(ctx: &SearchContext, p: Point) -> Option<FeatureRef> {
    if let Some(city) = ctx.cities_boundaries.city_at(p) {
        return Some(city);
    }
    let rect = rect_around(p, MAX_LOCALITY_RADIUS_M);
    let mut best: Option<(f64, FeatureRef)> = None;
    for tile in ctx.tiles() {
        tile.features.for_each_in_rect(&rect, u8::MAX, &mut |id| {
            let Some(feature) = tile.feature(id) else {
                return;
            };
            let search_type = ctx.model.search_type(feature);
            if !matches!(search_type, SearchType::City | SearchType::Village) {
                return;
            }
            let Some(center) = tile.center(id) else {
                return;
            };
            let d = distance_m(center, p);
            if d <= locality_radius_m(search_type, feature.population)
                && best.is_none_or(|(b, _)| d < b)
            {
                best = Some((d, FeatureRef::new(tile.id(), id)));
            }
        });
    }
    best.map(|(_, r)| r)
}

fn street_part(ctx: &SearchContext, r: FeatureRef, feature: &Feature, locale: &str) -> Option<String> {
    let tile = ctx.tile(r.tile)?;
    if let Some(street) = tile.addresses.street_of(r.id)
        && let Some(street) = tile.feature(street)
    {
        return Some(display_name(street, locale, None));
    }
    if let Some(street) = &feature.street {
        return Some(street.clone());
    }
    let center = tile.center(r.id)?;
    ReverseGeocoder::for_tile(tile)
        .nearby_streets(center, POI_STREET_RADIUS_M)
        .into_iter()
        .filter_map(|s| tile.feature(s.id))
        .find(|s| s.has_name())
        .map(|s| display_name(s, locale, None))
}

/// Comma separated address of a result, missing parts skipped.
/// `house_number` is the number to show for address features.
pub fn format_address(
    ctx: &SearchContext,
    r: FeatureRef,
    feature: &Feature,
    search_type: SearchType,
    house_number: Option<&str>,
    center: Point,
    locale: &str,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if matches!(
        search_type,
        SearchType::Building | SearchType::SubPoi | SearchType::ComplexPoi
    ) {
        if let Some(street) = street_part(ctx, r, feature, locale) {
            parts.push(street);
        } else if let Some(place) = &feature.place {
            parts.push(place.clone());
        }
        if let Some(hn) = house_number {
            parts.push(hn.to_owned());
        }
    }

    if !search_type.is_locality()
        && let Some(locality) = find_locality(ctx, center)
        && locality != r
        && let Some(locality) = ctx.feature(locality)
    {
        parts.push(display_name(locality, locale, None));
    }

    if search_type != SearchType::Country
        && let Some(region) = ctx.regions.region_at(center)
    {
        parts.push(region.name.clone());
    }

    parts.dedup();
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use offgrid_data::test_data::TestWorld;

    fn address_of(ctx: &SearchContext, r: FeatureRef) -> String {
        let feature = ctx.feature(r).unwrap();
        let center = ctx.center(r).unwrap();
        let search_type = ctx.model.search_type(feature);
        let hn = feature.house_number.as_deref();
        format_address(ctx, r, feature, search_type, hn, center, "en")
    }

    #[test]
    fn test_addresses_in_sample_world() {
        let world = TestWorld::sample().unwrap();
        let ctx = SearchContext::try_from(TestWorld::sample().unwrap()).unwrap();

        let house = world.find_house("Main Street", "2").unwrap();
        assert_eq!(address_of(&ctx, house), "Main Street, 2, Springfield, Testland");

        let cafe = world.find_named("Blue Cafe").unwrap();
        assert_eq!(address_of(&ctx, cafe), "Main Street, Springfield, Testland");

        let village_cafe = world.find_named("Village Cafe").unwrap();
        assert_eq!(
            address_of(&ctx, village_cafe),
            "Church Lane, Little Hamlet, Testland"
        );

        let old_town_house = ctx
            .tiles()
            .iter()
            .find_map(|tile| {
                (0..tile.features.num_features())
                    .filter_map(|id| tile.feature(id))
                    .find(|f| f.place.as_deref() == Some("Old Town"))
                    .map(|f| FeatureRef::new(tile.id(), f.id))
            })
            .unwrap();
        assert_eq!(
            address_of(&ctx, old_town_house),
            "Old Town, 7, Springfield, Testland"
        );

        let springfield = world.find_named("Springfield").unwrap();
        assert_eq!(address_of(&ctx, springfield), "Testland");
    }

    #[test]
    fn test_find_locality_without_boundary() {
        let ctx = SearchContext::try_from(TestWorld::sample().unwrap()).unwrap();
        let hamlet = find_locality(&ctx, Point::new(10.301, 50.301)).unwrap();
        assert_eq!(ctx.feature(hamlet).unwrap().default_name(), Some("Little Hamlet"));
        assert!(find_locality(&ctx, Point::new(12.0, 52.0)).is_none());
    }
}
