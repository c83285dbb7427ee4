//! Mapping of feature types to the search types the geocoder reasons about.

use std::fmt;

use offgrid_data::{
    Classificator, CompiledRule, Feature, TypeId,
    classif::rules,
};

/// Search types ordered from the most specific to the most general.
///
/// A feature of type `a` may belong to a feature of type `b` only when
/// `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SearchType {
    SubPoi,
    ComplexPoi,
    Building,
    Street,
    Suburb,
    Unclassified,
    Village,
    City,
    State,
    Country,
}

impl SearchType {
    pub const COUNT: usize = 10;

    /// Types that take part in layer matching, innermost first.
    pub const LAYER_TYPES: [Self; 5] = [
        Self::SubPoi,
        Self::ComplexPoi,
        Self::Building,
        Self::Street,
        Self::Suburb,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn is_locality(self) -> bool {
        matches!(self, Self::Village | Self::City | Self::State | Self::Country)
    }

    pub const fn is_poi(self) -> bool {
        matches!(self, Self::SubPoi | Self::ComplexPoi)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SubPoi => "SUBPOI",
            Self::ComplexPoi => "COMPLEX_POI",
            Self::Building => "BUILDING",
            Self::Street => "STREET",
            Self::Suburb => "SUBURB",
            Self::Unclassified => "UNCLASSIFIED",
            Self::Village => "VILLAGE",
            Self::City => "CITY",
            Self::State => "STATE",
            Self::Country => "COUNTRY",
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type rules compiled against one classificator.
#[derive(Debug, Clone)]
pub struct Model {
    country: CompiledRule,
    state: CompiledRule,
    city: CompiledRule,
    capital: CompiledRule,
    village: CompiledRule,
    suburb: CompiledRule,
    street: CompiledRule,
    building: CompiledRule,
    interpolation: CompiledRule,
    complex_poi: CompiledRule,
    poi: CompiledRule,
}

impl Model {
    pub fn new(classif: &Classificator) -> Self {
        Self {
            country: classif.compile(&rules::COUNTRY),
            state: classif.compile(&rules::STATE),
            city: classif.compile(&rules::CITY),
            capital: classif.compile(&rules::CAPITAL),
            village: classif.compile(&rules::VILLAGE),
            suburb: classif.compile(&rules::SUBURB),
            street: classif.compile(&rules::STREET),
            building: classif.compile(&rules::BUILDING),
            interpolation: classif.compile(&rules::ADDRESS_INTERPOLATION),
            complex_poi: classif.compile(&rules::COMPLEX_POI),
            poi: classif.compile(&rules::POI),
        }
    }

    pub fn search_type(&self, feature: &Feature) -> SearchType {
        self.search_type_of(&feature.types, feature.house_number.is_some())
    }

    /// The first matching rule wins: POIs with a house number stay POIs.
    pub fn search_type_of(&self, types: &[TypeId], has_house_number: bool) -> SearchType {
        if self.complex_poi.matches(types) {
            SearchType::ComplexPoi
        } else if self.poi.matches(types) {
            SearchType::SubPoi
        } else if self.building.matches(types)
            || (has_house_number && !self.street.matches(types))
        {
            SearchType::Building
        } else if self.street.matches(types) {
            SearchType::Street
        } else if self.suburb.matches(types) {
            SearchType::Suburb
        } else if self.country.matches(types) {
            SearchType::Country
        } else if self.state.matches(types) {
            SearchType::State
        } else if self.city.matches(types) {
            SearchType::City
        } else if self.village.matches(types) {
            SearchType::Village
        } else {
            SearchType::Unclassified
        }
    }

    pub fn is_capital(&self, types: &[TypeId]) -> bool {
        self.capital.matches(types)
    }

    pub fn is_interpolation(&self, types: &[TypeId]) -> bool {
        self.interpolation.matches(types)
    }

    pub fn is_street(&self, types: &[TypeId]) -> bool {
        self.street.matches(types)
    }

    /// The most specific of the feature's types.
    pub fn best_type(classif: &Classificator, types: &[TypeId]) -> Option<TypeId> {
        types
            .iter()
            .copied()
            .max_by(|a, b| classif.depth(*a).cmp(&classif.depth(*b)).then(b.cmp(a)))
    }
}

/// Radius of a city or village, derived from its population. Localities
/// without a population get a typical one for their type.
pub fn locality_radius_m(search_type: SearchType, population: u64) -> f64 {
    let population = match (population, search_type) {
        (0, SearchType::City) => 100_000,
        (0, _) => 1_000,
        (p, _) => p,
    };
    (population as f64).powf(1.0 / 3.6) * 550.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use offgrid_data::test_data::standard_classificator;

    #[test]
    fn test_search_type_order() {
        assert!(SearchType::SubPoi < SearchType::Building);
        assert!(SearchType::Street < SearchType::Suburb);
        assert!(SearchType::Suburb < SearchType::Unclassified);
        assert!(SearchType::City < SearchType::Country);
        assert!(SearchType::Village.is_locality());
        assert!(!SearchType::Unclassified.is_locality());
    }

    #[test]
    fn test_search_type_of_features() {
        let classif = standard_classificator();
        let model = Model::new(&classif);
        let t = |p: &str| classif.find(p).unwrap();

        let cafe = Feature::point(0.0, 0.0).typed(t("amenity-cafe")).house_number("5");
        assert_eq!(model.search_type(&cafe), SearchType::SubPoi);
        let mall = Feature::point(0.0, 0.0).typed(t("shop-mall"));
        assert_eq!(model.search_type(&mall), SearchType::ComplexPoi);
        let house = Feature::point(0.0, 0.0).house_number("5");
        assert_eq!(model.search_type(&house), SearchType::Building);
        let street = Feature::line(&[(0.0, 0.0), (1.0, 0.0)]).typed(t("highway-residential"));
        assert_eq!(model.search_type(&street), SearchType::Street);
        let capital = Feature::point(0.0, 0.0).typed(t("place-city-capital"));
        assert_eq!(model.search_type(&capital), SearchType::City);
        assert!(model.is_capital(&capital.types));
        let park = Feature::point(0.0, 0.0).typed(t("leisure-park"));
        assert_eq!(model.search_type(&park), SearchType::Unclassified);
        let stop = Feature::point(0.0, 0.0).typed(t("highway-bus_stop"));
        assert_eq!(model.search_type(&stop), SearchType::SubPoi);
    }

    #[test]
    fn test_locality_radius_grows_with_population() {
        let village = locality_radius_m(SearchType::Village, 300);
        let city = locality_radius_m(SearchType::City, 500_000);
        assert!(village > 2_000.0 && village < 3_500.0);
        assert!(city > 15_000.0 && city < 30_000.0);
        assert_eq!(
            locality_radius_m(SearchType::City, 0),
            locality_radius_m(SearchType::Village, 100_000)
        );
    }

    #[test]
    fn test_best_type_prefers_specific() {
        let classif = standard_classificator();
        let city = classif.find("place-city").unwrap();
        let capital = classif.find("place-city-capital").unwrap();
        assert_eq!(Model::best_type(&classif, &[city, capital]), Some(capital));
        assert_eq!(Model::best_type(&classif, &[]), None);
    }
}
