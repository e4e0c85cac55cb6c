//! Country-name normalization: resolve spelling variants from different sources
//! (Wikipedia, FAO, CIA Factbook, hand-copied tables) to the registry's canonical names.
//!
//! Matching is exact first, then a case-sensitive lookup in a curated variant table.
//! An edit-distance fallback exists but is opt-in and every use of it is logged.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Canonical name -> known variants.
pub type VariantTable = BTreeMap<String, Vec<String>>;

/// How a raw name was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    Exact { canonical: String },
    Variant { canonical: String },
    Fuzzy { canonical: String, distance: usize },
    NotFound,
}

impl Resolution {
    pub fn canonical(&self) -> Option<&str> {
        match self {
            Self::Exact { canonical }
            | Self::Variant { canonical }
            | Self::Fuzzy { canonical, .. } => Some(canonical),
            Self::NotFound => None,
        }
    }
}

/// Opt-in edit-distance fallback. Off unless configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzyFallback {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_distance")]
    pub max_distance: usize,
}

fn default_max_distance() -> usize {
    2
}

impl Default for FuzzyFallback {
    fn default() -> Self {
        FuzzyFallback {
            enabled: false,
            max_distance: default_max_distance(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NameNormalizer {
    variants: VariantTable,
    /// variant -> canonical
    reverse: HashMap<String, String>,
    canonical: BTreeSet<String>,
    fuzzy: FuzzyFallback,
}

impl NameNormalizer {
    pub fn new(variants: VariantTable) -> Self {
        let mut reverse = HashMap::new();
        let mut canonical = BTreeSet::new();
        for (name, alternates) in &variants {
            canonical.insert(name.clone());
            for alternate in alternates {
                reverse
                    .entry(alternate.clone())
                    .or_insert_with(|| name.clone());
            }
        }
        NameNormalizer {
            variants,
            reverse,
            canonical,
            fuzzy: FuzzyFallback::default(),
        }
    }

    /// Normalizer over the built-in variant table.
    pub fn with_default_variants() -> Self {
        Self::new(default_variants())
    }

    /// Register the names a registry treats as canonical so they resolve exactly.
    pub fn with_canonical_names<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.canonical.extend(names.into_iter().map(str::to_string));
        self
    }

    pub fn with_fuzzy(mut self, fuzzy: FuzzyFallback) -> Self {
        self.fuzzy = fuzzy;
        self
    }

    pub fn fuzzy_enabled(&self) -> bool {
        self.fuzzy.enabled
    }

    pub fn variants(&self) -> &VariantTable {
        &self.variants
    }

    /// Resolve a free-text name to a canonical one. Pure apart from the warning
    /// logged when the fuzzy fallback is used.
    pub fn resolve(&self, raw: &str) -> Resolution {
        let trimmed = raw.trim();
        if self.canonical.contains(trimmed) {
            return Resolution::Exact {
                canonical: trimmed.to_string(),
            };
        }
        if let Some(canonical) = self.reverse.get(trimmed) {
            return Resolution::Variant {
                canonical: canonical.clone(),
            };
        }
        if self.fuzzy.enabled {
            if let Some((canonical, distance)) = self.closest(trimmed) {
                warn!("fuzzy match: '{trimmed}' -> '{canonical}' (edit distance {distance})");
                return Resolution::Fuzzy {
                    canonical,
                    distance,
                };
            }
        }
        Resolution::NotFound
    }

    /// Canonical name for `raw`, or `None` when it cannot be resolved.
    pub fn canonical(&self, raw: &str) -> Option<String> {
        self.resolve(raw).canonical().map(str::to_string)
    }

    /// The canonical name followed by its variants in declared order.
    pub fn candidates<'a>(&'a self, canonical: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        std::iter::once(canonical).chain(
            self.variants
                .get(canonical)
                .into_iter()
                .flatten()
                .map(String::as_str),
        )
    }

    /// Unique closest canonical/variant name within the configured distance.
    /// Ties are treated as no match.
    fn closest(&self, raw: &str) -> Option<(String, usize)> {
        let needle = raw.to_lowercase();
        let mut best: Option<(String, usize)> = None;
        let mut tied = false;
        let known = self
            .canonical
            .iter()
            .map(|name| (name.as_str(), name.as_str()))
            .chain(
                self.reverse
                    .iter()
                    .map(|(variant, canonical)| (variant.as_str(), canonical.as_str())),
            );
        for (candidate, canonical) in known {
            let distance = levenshtein(&needle, &candidate.to_lowercase());
            if distance > self.fuzzy.max_distance {
                continue;
            }
            match &best {
                Some((current, d)) if distance == *d && current != canonical => tied = true,
                Some((_, d)) if distance >= *d => {}
                _ => {
                    best = Some((canonical.to_string(), distance));
                    tied = false;
                }
            }
        }
        if tied {
            None
        } else {
            best
        }
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0; b_chars.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b_chars.len()]
}

/// Curated variants seen across the Wikipedia, FAO, Numbeo and World Bank tables.
pub fn default_variants() -> VariantTable {
    let table: &[(&str, &[&str])] = &[
        (
            "United States",
            &["USA", "US", "U.S.", "U.S.A.", "United States of America"],
        ),
        (
            "United Kingdom",
            &[
                "UK",
                "Great Britain",
                "Britain",
                "United Kingdom of Great Britain and Northern Ireland",
            ],
        ),
        (
            "South Korea",
            &["Korea, South", "Republic of Korea", "Korea (South)", "Korea, Rep.", "Korea Rep."],
        ),
        ("Czech Republic", &["Czechia", "Czech Rep."]),
        ("Netherlands", &["Holland", "Netherlands (Kingdom of the)"]),
        ("New Zealand", &["NZ"]),
        ("South Africa", &["RSA", "Republic of South Africa"]),
        ("Vietnam", &["Viet Nam"]),
        (
            "China",
            &[
                "China, People's Republic",
                "PRC",
                "People's Republic of China",
                "China PR",
                "China, mainland",
            ],
        ),
        ("Turkey", &["Türkiye", "Turkiye"]),
        ("Egypt", &["Egypt, Arab Rep."]),
        ("Iran", &["Iran, Islamic Rep.", "Iran (Islamic Republic of)"]),
        ("Russia", &["Russian Federation"]),
    ];
    table
        .iter()
        .map(|(canonical, variants)| {
            (
                canonical.to_string(),
                variants.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect()
}

/// Load a variant table from YAML or JSON (chosen by extension; `.json` is JSON, anything else YAML).
pub fn load_variants(path: impl AsRef<Path>) -> Result<VariantTable> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|err| Error::read(path, err))?;
    let context = path.display().to_string();
    if path.extension().map_or(false, |ext| ext == "json") {
        serde_json::from_str(&raw).map_err(|err| Error::json(context, err))
    } else {
        serde_yaml::from_str(&raw).map_err(|err| Error::yaml(context, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> NameNormalizer {
        NameNormalizer::with_default_variants().with_canonical_names(["France", "Egypt"])
    }

    #[test]
    fn canonical_names_resolve_to_themselves() {
        let n = normalizer();
        for name in ["United States", "Czech Republic", "France"] {
            assert_eq!(n.canonical(name).as_deref(), Some(name));
            let once = n.canonical(name).unwrap();
            assert_eq!(n.canonical(&once), Some(once.clone()));
        }
    }

    #[test]
    fn variants_resolve_case_sensitively() {
        let n = normalizer();
        assert_eq!(
            n.resolve("Czechia"),
            Resolution::Variant {
                canonical: "Czech Republic".to_string()
            }
        );
        assert_eq!(n.canonical("USA").as_deref(), Some("United States"));
        assert_eq!(n.resolve("usa"), Resolution::NotFound);
    }

    #[test]
    fn fuzzy_fallback_is_off_by_default() {
        assert_eq!(normalizer().resolve("Frnace"), Resolution::NotFound);
    }

    #[test]
    fn fuzzy_fallback_reports_distance() {
        let n = normalizer().with_fuzzy(FuzzyFallback {
            enabled: true,
            max_distance: 2,
        });
        assert_eq!(
            n.resolve("Frnace"),
            Resolution::Fuzzy {
                canonical: "France".to_string(),
                distance: 2
            }
        );
        assert_eq!(n.resolve("Atlantis"), Resolution::NotFound);
    }

    #[test]
    fn candidates_start_with_canonical_name() {
        let n = normalizer();
        let candidates: Vec<_> = n.candidates("Czech Republic").collect();
        assert_eq!(candidates, vec!["Czech Republic", "Czechia", "Czech Rep."]);
        let plain: Vec<_> = n.candidates("France").collect();
        assert_eq!(plain, vec!["France"]);
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }
}
