//! Ransack-style variant search and page arithmetic.
//!
//! Query keys look like `q[sku_cont]=PEA`: a field name followed by a
//! predicate suffix. Keys naming an unknown field or predicate are ignored, as
//! are values that do not parse for the field (a non-numeric price).

use serde::Serialize;

use harvest_catalog::{Product, Variant};
use harvest_core::parse_minor_units;

pub const DEFAULT_PER_PAGE: u32 = 25;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Field {
    Sku,
    ProductId,
    DisplayName,
    IsMaster,
    Price,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "sku" => Some(Field::Sku),
            "product_id" => Some(Field::ProductId),
            "display_name" => Some(Field::DisplayName),
            "is_master" => Some(Field::IsMaster),
            "price" => Some(Field::Price),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Predicate {
    Eq,
    Cont,
    Start,
    End,
    Lt,
    Gt,
}

const PREDICATES: [(&str, Predicate); 6] = [
    ("_cont", Predicate::Cont),
    ("_start", Predicate::Start),
    ("_end", Predicate::End),
    ("_eq", Predicate::Eq),
    ("_lt", Predicate::Lt),
    ("_gt", Predicate::Gt),
];

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Text(String),
    Flag(bool),
    Amount(u64),
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    field: Field,
    predicate: Predicate,
    operand: Operand,
}

impl Condition {
    fn parse(key: &str, value: &str) -> Option<Self> {
        let key = key
            .strip_prefix("q[")
            .and_then(|k| k.strip_suffix(']'))
            .unwrap_or(key);
        let (field, predicate) = PREDICATES.iter().find_map(|(suffix, predicate)| {
            key.strip_suffix(suffix)
                .and_then(Field::parse)
                .map(|field| (field, *predicate))
        })?;

        let operand = match field {
            Field::IsMaster => Operand::Flag(match value.trim() {
                "true" | "1" | "t" => true,
                "false" | "0" | "f" => false,
                _ => return None,
            }),
            Field::Price => Operand::Amount(parse_minor_units("price", value).ok()?),
            _ => Operand::Text(value.to_string()),
        };

        Some(Self {
            field,
            predicate,
            operand,
        })
    }

    fn matches(&self, product: &Product, variant: &Variant) -> bool {
        match &self.operand {
            Operand::Flag(flag) => match self.predicate {
                Predicate::Eq => variant.is_master == *flag,
                _ => true,
            },
            Operand::Amount(amount) => match self.predicate {
                Predicate::Eq => variant.price == *amount,
                Predicate::Lt => variant.price < *amount,
                Predicate::Gt => variant.price > *amount,
                _ => true,
            },
            Operand::Text(needle) => {
                let product_id;
                let haystack = match self.field {
                    Field::Sku => variant.sku.as_str(),
                    Field::DisplayName => variant.display_name.as_str(),
                    Field::ProductId => {
                        product_id = product.id_typed().to_string();
                        product_id.as_str()
                    }
                    Field::IsMaster | Field::Price => return true,
                };
                text_matches(self.predicate, haystack, needle)
            }
        }
    }
}

fn text_matches(predicate: Predicate, haystack: &str, needle: &str) -> bool {
    let folded = haystack.to_lowercase();
    let needle_folded = needle.to_lowercase();
    match predicate {
        Predicate::Eq => haystack == needle,
        Predicate::Cont => folded.contains(&needle_folded),
        Predicate::Start => folded.starts_with(&needle_folded),
        Predicate::End => folded.ends_with(&needle_folded),
        Predicate::Lt => haystack < needle,
        Predicate::Gt => haystack > needle,
    }
}

/// Conjunction of `q[...]` conditions over variants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantSearch {
    conditions: Vec<Condition>,
}

impl VariantSearch {
    /// Build from raw query pairs; keys that are not search conditions
    /// (`page`, `per_page`, `show_deleted`) are skipped.
    pub fn from_params<'a>(params: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let conditions = params
            .into_iter()
            .filter_map(|(key, value)| {
                let condition = Condition::parse(key, value);
                if condition.is_none() && key.starts_with("q[") {
                    tracing::debug!(key, "ignoring unsupported search predicate");
                }
                condition
            })
            .collect();
        Self { conditions }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, product: &Product, variant: &Variant) -> bool {
        self.conditions.iter().all(|c| c.matches(product, variant))
    }
}

/// Requested page window. Page numbers start at 1.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl Page {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.filter(|p| *p > 0).unwrap_or(DEFAULT_PER_PAGE).min(MAX_PER_PAGE),
        }
    }

    /// Same as [`Page::new`] with a caller-chosen ceiling (the bulk product
    /// listing allows up to 500 per page).
    pub fn with_max(page: Option<u32>, per_page: Option<u32>, max: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.filter(|p| *p > 0).unwrap_or(DEFAULT_PER_PAGE).min(max),
        }
    }
}

/// One page of results plus the counters the index endpoints render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub count: usize,
    pub total_count: usize,
    pub current_page: u32,
    pub pages: u32,
    pub per_page: u32,
}

pub fn paginate<T>(items: Vec<T>, page: Page) -> Paginated<T> {
    let total_count = items.len();
    let per_page = page.per_page.max(1) as usize;
    let pages = total_count.div_ceil(per_page) as u32;
    let offset = (page.page.saturating_sub(1) as usize).saturating_mul(per_page);

    let items: Vec<T> = items.into_iter().skip(offset).take(per_page).collect();
    Paginated {
        count: items.len(),
        items,
        total_count,
        current_page: page.page,
        pages,
        per_page: page.per_page,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use harvest_catalog::{CreateProduct, ProductCommand, ProductId, UnitSettings, VariantId};
    use harvest_core::{Aggregate, AggregateId};
    use harvest_enterprises::EnterpriseId;

    fn product(sku: &str, price: u64) -> Product {
        let id = ProductId::new(AggregateId::new());
        let mut product = Product::empty(id);
        let events = product
            .handle(&ProductCommand::Create(CreateProduct {
                product_id: id,
                name: "Beans".to_string(),
                description: String::new(),
                permalink: String::new(),
                supplier: EnterpriseId::new(AggregateId::new()),
                units: UnitSettings::weight(1.0),
                master_variant_id: VariantId::new(),
                variant_id: VariantId::new(),
                sku: sku.to_string(),
                price: Some(price),
                cost_price: None,
                unit_value: Some(250.0),
                unit_description: String::new(),
                on_hand: 1,
                on_demand: false,
                image: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for e in &events {
            product.apply(e);
        }
        product
    }

    fn search(pairs: &[(&str, &str)]) -> VariantSearch {
        VariantSearch::from_params(pairs.iter().copied())
    }

    #[test]
    fn text_predicates() {
        let p = product("BEAN-GREEN", 400);
        let master = p.master().unwrap();

        assert!(search(&[("q[sku_eq]", "BEAN-GREEN")]).matches(&p, master));
        assert!(!search(&[("q[sku_eq]", "bean-green")]).matches(&p, master));
        assert!(search(&[("q[sku_cont]", "green")]).matches(&p, master));
        assert!(search(&[("q[sku_start]", "bean")]).matches(&p, master));
        assert!(search(&[("q[sku_end]", "EEN")]).matches(&p, master));
        assert!(!search(&[("q[sku_cont]", "red")]).matches(&p, master));
    }

    #[test]
    fn typed_predicates() {
        let p = product("B", 400);
        let master = p.master().unwrap();
        let standard = p.standard_variants().next().unwrap();

        let masters = search(&[("q[is_master_eq]", "true")]);
        assert!(masters.matches(&p, master));
        assert!(!masters.matches(&p, standard));

        assert!(search(&[("q[price_lt]", "4.01")]).matches(&p, master));
        assert!(!search(&[("q[price_gt]", "4.00")]).matches(&p, master));
        let id = p.id_typed().to_string();
        assert!(search(&[("q[product_id_eq]", id.as_str())]).matches(&p, standard));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let s = search(&[("q[colour_eq]", "red"), ("q[sku_like]", "x"), ("page", "2"), ("q[price_eq]", "abc")]);
        assert!(s.is_empty());
    }

    #[test]
    fn page_defaults_and_caps() {
        assert_eq!(Page::new(None, None), Page { page: 1, per_page: 25 });
        assert_eq!(Page::new(Some(0), Some(1000)), Page { page: 1, per_page: 100 });
        assert_eq!(Page::with_max(Some(2), Some(500), 500).per_page, 500);
    }

    #[test]
    fn paginate_reports_counters() {
        let page = paginate((1..=7).collect::<Vec<_>>(), Page::new(Some(2), Some(3)));
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.count, 3);
        assert_eq!(page.total_count, 7);
        assert_eq!(page.pages, 3);

        let empty = paginate(Vec::<u8>::new(), Page::default());
        assert_eq!(empty.pages, 0);
        assert_eq!(empty.count, 0);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn pages_cover_every_item_once(total in 0usize..300, per_page in 1u32..120) {
                let items: Vec<usize> = (0..total).collect();
                let first = paginate(items.clone(), Page::new(Some(1), Some(per_page)));
                let mut seen = Vec::new();
                for n in 1..=first.pages.max(1) {
                    seen.extend(paginate(items.clone(), Page::new(Some(n), Some(per_page))).items);
                }
                prop_assert_eq!(seen, items);
                prop_assert!(first.per_page <= MAX_PER_PAGE);
            }
        }
    }
}
