use crate::config::{CategoryWeights, WeightPolicy};
use crate::error::EngineError;
use crate::model::{Category, Domain};
use serde::Serialize;
use std::collections::BTreeMap;

/// One assessment result for one student, already stripped of absent/exempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedItem {
    pub score: f64,
    pub max_score: f64,
    pub category: Category,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainItem {
    pub domain: Domain,
    pub item: WeightedItem,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAverage {
    pub category: Category,
    pub average: f64,
    pub item_count: usize,
    pub effective_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedAverage {
    pub percent: f64,
    pub categories: Vec<CategoryAverage>,
}

/// Simple (unweighted) mean percentage per category present in `items`.
/// Items with a non-positive maximum cannot produce a percentage and are dropped.
fn category_means(items: &[WeightedItem]) -> BTreeMap<Category, (f64, usize)> {
    let mut sums: BTreeMap<Category, (f64, usize)> = BTreeMap::new();
    for it in items {
        if it.max_score <= 0.0 || !it.max_score.is_finite() || !it.score.is_finite() {
            continue;
        }
        let entry = sums.entry(it.category).or_insert((0.0, 0));
        entry.0 += 100.0 * it.score / it.max_score;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(cat, (sum, n))| (cat, (sum / n as f64, n)))
        .collect()
}

/// Category-weighted percentage with weights renormalized over the
/// categories actually present. `None` means "no data".
///
/// If every present category carries a nominal weight of zero the present
/// categories are weighted equally instead.
pub fn weighted_average(
    items: &[WeightedItem],
    weights: &CategoryWeights,
) -> Option<WeightedAverage> {
    let means = category_means(items);
    if means.is_empty() {
        return None;
    }

    let nominal_total: f64 = means.keys().map(|c| weights.get(*c)).sum();
    let equal_share = 1.0 / means.len() as f64;

    let mut percent = 0.0_f64;
    let mut categories = Vec::with_capacity(means.len());
    for (category, (average, item_count)) in means {
        let effective_weight = if nominal_total > 0.0 {
            weights.get(category) / nominal_total
        } else {
            equal_share
        };
        percent += average * effective_weight;
        categories.push(CategoryAverage {
            category,
            average,
            item_count,
            effective_weight,
        });
    }

    Some(WeightedAverage {
        percent: percent.clamp(0.0, 100.0),
        categories,
    })
}

/// Resolves the band's weights from the injected policy, then aggregates.
pub fn weighted_average_for_band(
    items: &[WeightedItem],
    policy: &WeightPolicy,
    band: &str,
) -> Result<Option<WeightedAverage>, EngineError> {
    let weights = policy.weights_for_band(band)?;
    Ok(weighted_average(items, weights))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainAverage {
    pub domain: Domain,
    pub average: WeightedAverage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRollup {
    pub domains: Vec<DomainAverage>,
    /// Equal-weight mean of the domain percentages; `None` when no domain has data.
    pub overall: Option<f64>,
}

/// Per-domain weighted averages, then an overall that weighs each domain
/// equally rather than each assessment.
pub fn domain_rollup(items: &[DomainItem], weights: &CategoryWeights) -> DomainRollup {
    let mut by_domain: BTreeMap<Domain, Vec<WeightedItem>> = BTreeMap::new();
    for di in items {
        by_domain.entry(di.domain).or_default().push(di.item);
    }

    let domains: Vec<DomainAverage> = by_domain
        .into_iter()
        .filter_map(|(domain, items)| {
            weighted_average(&items, weights).map(|average| DomainAverage { domain, average })
        })
        .collect();

    let overall = if domains.is_empty() {
        None
    } else {
        Some(domains.iter().map(|d| d.average.percent).sum::<f64>() / domains.len() as f64)
    };

    DomainRollup { domains, overall }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: CategoryWeights = CategoryWeights {
        formative: 0.5,
        summative: 0.3,
        performance_task: 0.2,
    };

    fn item(score: f64, max_score: f64, category: Category) -> WeightedItem {
        WeightedItem {
            score,
            max_score,
            category,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_input_is_no_data() {
        assert_eq!(weighted_average(&[], &W), None);
    }

    #[test]
    fn zero_max_items_are_dropped() {
        let items = [item(5.0, 0.0, Category::Formative)];
        assert_eq!(weighted_average(&items, &W), None);

        let items = [
            item(5.0, 0.0, Category::Formative),
            item(8.0, 10.0, Category::Formative),
        ];
        let avg = weighted_average(&items, &W).expect("data");
        assert!(close(avg.percent, 80.0));
    }

    #[test]
    fn weights_renormalize_over_present_categories() {
        let items = [
            item(8.0, 10.0, Category::Formative),
            item(40.0, 100.0, Category::Summative),
        ];
        let avg = weighted_average(&items, &W).expect("data");
        let f = &avg.categories[0];
        let s = &avg.categories[1];
        assert_eq!(f.category, Category::Formative);
        assert!(close(f.effective_weight, 5.0 / 8.0));
        assert!(close(s.effective_weight, 3.0 / 8.0));
        assert!(close(avg.percent, 80.0 * 5.0 / 8.0 + 40.0 * 3.0 / 8.0));
    }

    #[test]
    fn items_within_category_count_equally() {
        // 1/2 and 90/100 -> (50 + 90) / 2, regardless of point totals.
        let items = [
            item(1.0, 2.0, Category::Summative),
            item(90.0, 100.0, Category::Summative),
        ];
        let avg = weighted_average(&items, &W).expect("data");
        assert!(close(avg.percent, 70.0));
        assert_eq!(avg.categories[0].item_count, 2);
    }

    #[test]
    fn order_does_not_matter() {
        let mut items = vec![
            item(3.0, 4.0, Category::PerformanceTask),
            item(7.0, 10.0, Category::Formative),
            item(18.0, 20.0, Category::Summative),
            item(2.0, 10.0, Category::Formative),
        ];
        let a = weighted_average(&items, &W).expect("data");
        items.reverse();
        let b = weighted_average(&items, &W).expect("data");
        assert!(close(a.percent, b.percent));
    }

    #[test]
    fn all_zero_weights_fall_back_to_equal() {
        let w = CategoryWeights {
            formative: 0.0,
            summative: 1.0,
            performance_task: 0.0,
        };
        let items = [
            item(6.0, 10.0, Category::Formative),
            item(10.0, 10.0, Category::PerformanceTask),
        ];
        let avg = weighted_average(&items, &w).expect("data");
        assert!(close(avg.percent, 80.0));
    }

    #[test]
    fn result_is_clamped_to_percent_range() {
        let items = [item(15.0, 10.0, Category::Formative)];
        let avg = weighted_average(&items, &W).expect("data");
        assert_eq!(avg.percent, 100.0);
        assert!(close(avg.categories[0].average, 150.0));
    }

    #[test]
    fn unknown_band_surfaces_policy_error() {
        let policy = WeightPolicy::default();
        assert!(weighted_average_for_band(&[], &policy, "primary")
            .expect("known band")
            .is_none());
        assert!(weighted_average_for_band(&[], &policy, "nope").is_err());
    }

    #[test]
    fn domains_weigh_equally_in_overall() {
        let items = [
            DomainItem {
                domain: Domain::Reading,
                item: item(10.0, 10.0, Category::Formative),
            },
            DomainItem {
                domain: Domain::Reading,
                item: item(10.0, 10.0, Category::Formative),
            },
            DomainItem {
                domain: Domain::Reading,
                item: item(10.0, 10.0, Category::Formative),
            },
            DomainItem {
                domain: Domain::Writing,
                item: item(5.0, 10.0, Category::Formative),
            },
        ];
        let rollup = domain_rollup(&items, &W);
        assert_eq!(rollup.domains.len(), 2);
        assert_eq!(rollup.domains[0].domain, Domain::Reading);
        assert!(close(rollup.overall.expect("overall"), 75.0));
    }

    #[test]
    fn empty_rollup_has_no_overall() {
        let rollup = domain_rollup(&[], &W);
        assert!(rollup.domains.is_empty());
        assert_eq!(rollup.overall, None);
    }
}
