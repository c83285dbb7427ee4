//! Feature classification: type paths, data-driven type rules, localized
//! category names and word synonyms.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use itertools::Itertools;

use crate::{
    error::{DataError, Result},
    normalize::{normalize, tokenize},
};

/// Compact id of a classificator type such as `amenity-cafe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeId(pub u32);

/// Bidirectional mapping between type paths and ids.
///
/// Paths are `-`-separated from the most generic to the most specific
/// component: `place-city-capital` is under `place-city` and under `place`.
#[derive(Debug, Clone, Default)]
pub struct Classificator {
    paths: Vec<String>,
    by_path: HashMap<String, TypeId>,
}

impl Classificator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types<'a>(paths: impl IntoIterator<Item = &'a str>) -> Self {
        let mut classif = Self::new();
        for path in paths {
            classif.register(path);
        }
        classif
    }

    /// Registers `path`, returning the existing id when already known.
    pub fn register(&mut self, path: &str) -> TypeId {
        if let Some(&id) = self.by_path.get(path) {
            return id;
        }
        let id = TypeId(self.paths.len() as u32);
        self.paths.push(path.to_owned());
        self.by_path.insert(path.to_owned(), id);
        id
    }

    pub fn find(&self, path: &str) -> Option<TypeId> {
        self.by_path.get(path).copied()
    }

    pub fn get(&self, path: &str) -> Result<TypeId> {
        self.find(path)
            .ok_or_else(|| DataError::UnknownType(path.to_owned()))
    }

    pub fn path(&self, id: TypeId) -> Option<&str> {
        self.paths.get(id.0 as usize).map(String::as_str)
    }

    /// True when `id` is `prefix` itself or one of its descendants.
    pub fn is_under(&self, id: TypeId, prefix: &str) -> bool {
        self.path(id).is_some_and(|path| {
            path == prefix
                || (path.len() > prefix.len()
                    && path.starts_with(prefix)
                    && path.as_bytes()[prefix.len()] == b'-')
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &str)> {
        self.paths
            .iter()
            .enumerate()
            .map(|(i, p)| (TypeId(i as u32), p.as_str()))
    }

    /// Number of path components, used to prefer specific types over
    /// generic ones when picking a feature's best type.
    pub fn depth(&self, id: TypeId) -> usize {
        self.path(id).map_or(0, |p| p.split('-').count())
    }

    /// Builds the set of concrete type ids a rule accepts.
    pub fn compile(&self, rule: &TypeRule) -> CompiledRule {
        let ids = self
            .iter()
            .filter(|(id, _)| {
                rule.include.iter().any(|p| self.is_under(*id, p))
                    && !rule.exclude.iter().any(|p| self.is_under(*id, p))
            })
            .map(|(id, _)| id)
            .collect();
        CompiledRule { ids }
    }
}

/// A predicate over feature types expressed as type path prefixes.
#[derive(Debug, Clone, Copy)]
pub struct TypeRule {
    pub include: &'static [&'static str],
    pub exclude: &'static [&'static str],
}

impl TypeRule {
    pub const fn new(include: &'static [&'static str]) -> Self {
        Self {
            include,
            exclude: &[],
        }
    }

    pub const fn excluding(mut self, exclude: &'static [&'static str]) -> Self {
        self.exclude = exclude;
        self
    }

    /// Uncompiled check, fine for one-off use while building tiles.
    pub fn matches(&self, classif: &Classificator, types: &[TypeId]) -> bool {
        types.iter().any(|&t| {
            self.include.iter().any(|p| classif.is_under(t, p))
                && !self.exclude.iter().any(|p| classif.is_under(t, p))
        })
    }
}

pub mod rules {
    //! Type rules for every feature role the search pipeline cares about.
    use super::TypeRule;

    pub const COUNTRY: TypeRule = TypeRule::new(&["place-country"]);
    pub const STATE: TypeRule = TypeRule::new(&["place-state"]);
    pub const CITY: TypeRule = TypeRule::new(&["place-city", "place-town"]);
    pub const CAPITAL: TypeRule = TypeRule::new(&["place-city-capital"]);
    pub const VILLAGE: TypeRule = TypeRule::new(&["place-village", "place-hamlet"]);
    pub const SUBURB: TypeRule =
        TypeRule::new(&["place-suburb", "place-neighbourhood", "place-quarter"]);
    pub const STREET: TypeRule =
        TypeRule::new(&["highway", "place-square"]).excluding(&["highway-bus_stop"]);
    pub const BUILDING: TypeRule = TypeRule::new(&["building", "addr-interpolation"]);
    pub const ADDRESS_INTERPOLATION: TypeRule = TypeRule::new(&["addr-interpolation"]);
    pub const COMPLEX_POI: TypeRule = TypeRule::new(&[
        "shop-mall",
        "amenity-university",
        "amenity-hospital",
        "aeroway-aerodrome",
        "railway-station",
        "tourism-theme_park",
    ]);
    pub const POI: TypeRule = TypeRule::new(&[
        "amenity",
        "shop",
        "tourism",
        "office",
        "craft",
        "emergency",
        "historic",
        "highway-bus_stop",
        "railway-halt",
        "leisure-sports_centre",
    ]);
}

/// A rule resolved against one classificator.
#[derive(Debug, Clone, Default)]
pub struct CompiledRule {
    ids: HashSet<TypeId>,
}

impl CompiledRule {
    pub fn matches(&self, types: &[TypeId]) -> bool {
        types.iter().any(|t| self.ids.contains(t))
    }

    pub fn contains(&self, t: TypeId) -> bool {
        self.ids.contains(&t)
    }
}

/// Localized category names, e.g. `en: "cafe" -> [amenity-cafe]`.
#[derive(Debug, Clone, Default)]
pub struct CategoriesTable {
    by_locale: HashMap<String, HashMap<String, Vec<TypeId>>>,
}

impl CategoriesTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a (possibly multi-word) category name. Every word of the name
    /// becomes a category token for the given types.
    pub fn add(&mut self, locale: &str, name: &str, types: &[TypeId]) {
        let table = self.by_locale.entry(locale.to_owned()).or_default();
        for token in tokenize(name) {
            let entry = table.entry(token).or_default();
            entry.extend_from_slice(types);
            entry.sort_unstable();
            entry.dedup();
        }
    }

    /// Types whose category name contains `token` in `locale`, falling back
    /// to English.
    pub fn types_for(&self, locale: &str, token: &str) -> &[TypeId] {
        let token = normalize(token);
        [locale, "en"]
            .into_iter()
            .unique()
            .filter_map(|l| self.by_locale.get(l))
            .find_map(|t| t.get(&token))
            .map_or(&[][..], Vec::as_slice)
    }

    pub fn is_category_token(&self, locale: &str, token: &str) -> bool {
        !self.types_for(locale, token).is_empty()
    }
}

/// Word synonyms (`st` -> `street`) plus the set of street designator words.
#[derive(Debug, Clone, Default)]
pub struct Synonyms {
    map: HashMap<String, Vec<String>>,
    street_words: HashSet<String>,
    /// Suffixes of glued street names and their short forms, e.g.
    /// `strasse` -> `str`.
    glued_street_suffixes: Vec<(String, String)>,
}

impl Synonyms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `a` and `b` interchangeable in both directions.
    pub fn add(&mut self, a: &str, b: &str) {
        let (a, b) = (normalize(a), normalize(b));
        self.map.entry(a.clone()).or_default().push(b.clone());
        self.map.entry(b).or_default().push(a);
    }

    pub fn expand(&self, word: &str) -> &[String] {
        self.map.get(word).map_or(&[][..], Vec::as_slice)
    }

    pub fn add_street_word(&mut self, word: &str) {
        self.street_words.insert(normalize(word));
    }

    pub fn is_street_word(&self, word: &str) -> bool {
        self.street_words.contains(word)
    }

    pub fn add_glued_street_suffix(&mut self, suffix: &str, short: &str) {
        self.glued_street_suffixes
            .push((normalize(suffix), normalize(short)));
    }

    pub fn glued_street_suffixes(&self) -> &[(String, String)] {
        &self.glued_street_suffixes
    }

    /// A small multilingual default table.
    pub fn standard() -> Self {
        let mut synonyms = Self::new();
        for (a, b) in [
            ("st", "street"),
            ("ave", "avenue"),
            ("rd", "road"),
            ("ln", "lane"),
            ("sq", "square"),
            ("ул", "улица"),
            ("пер", "переулок"),
            ("пр", "проспект"),
            ("str", "strasse"),
        ] {
            synonyms.add(a, b);
        }
        for word in [
            "street", "st", "avenue", "ave", "road", "rd", "lane", "ln", "square", "sq", "улица",
            "ул", "переулок", "пер", "проспект", "пр", "strasse", "str", "calle", "avenida",
        ] {
            synonyms.add_street_word(word);
        }
        synonyms.add_glued_street_suffix("strasse", "str");
        synonyms.add_glued_street_suffix("gasse", "g");
        synonyms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let mut c = Classificator::new();
        let a = c.register("amenity-cafe");
        let b = c.register("amenity-cafe");
        assert_eq!(a, b);
        assert_eq!(c.len(), 1);
        assert_eq!(c.path(a), Some("amenity-cafe"));
    }

    #[test]
    fn test_is_under_respects_component_boundaries() {
        let c = Classificator::with_types(["place-city", "place-city-capital", "place-cityhall"]);
        let capital = c.find("place-city-capital").unwrap();
        let cityhall = c.find("place-cityhall").unwrap();
        assert!(c.is_under(capital, "place-city"));
        assert!(c.is_under(capital, "place"));
        assert!(!c.is_under(cityhall, "place-city"));
    }

    #[test]
    fn test_compiled_rule_matches_like_uncompiled() {
        let c = Classificator::with_types([
            "highway-residential",
            "highway-bus_stop",
            "amenity-cafe",
            "place-square",
        ]);
        let compiled = c.compile(&rules::STREET);
        for (id, _) in c.iter() {
            assert_eq!(compiled.contains(id), rules::STREET.matches(&c, &[id]));
        }
        assert!(compiled.contains(c.find("place-square").unwrap()));
        assert!(!compiled.contains(c.find("highway-bus_stop").unwrap()));
    }

    #[test]
    fn test_categories_fall_back_to_english() {
        let c = Classificator::with_types(["amenity-cafe"]);
        let cafe = c.find("amenity-cafe").unwrap();
        let mut cats = CategoriesTable::new();
        cats.add("en", "Cafe", &[cafe]);
        cats.add("ru", "Кафе", &[cafe]);
        assert_eq!(cats.types_for("ru", "кафе"), &[cafe]);
        assert_eq!(cats.types_for("de", "cafe"), &[cafe]);
        assert!(cats.types_for("de", "bar").is_empty());
    }

    #[test]
    fn test_synonyms_are_symmetric() {
        let s = Synonyms::standard();
        assert!(s.expand("st").iter().any(|w| w == "street"));
        assert!(s.expand("street").iter().any(|w| w == "st"));
        assert!(s.is_street_word("переулок"));
    }
}
