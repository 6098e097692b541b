//! Legacy species → taxonomic tree.
//!
//! Every species becomes a leaf. Species without an order are top-level
//! taxa, in legacy order. The remaining species are grouped by order
//! (first-seen order of distinct names) and, within an order, by family
//! (first-seen, empty family names excluded). Group ids are the lower-cased
//! group names.
//!
//! Species that have an order but no family are kept as direct children of
//! their order node, after the family nodes, so no species is ever dropped.

use crate::models::{
    localized, LegacyImage, LegacySpecies, MediaLinks, Taxon, TaxonGroup, TaxonLeaf,
};
use crate::transform::characters::image_for;

/// A leaf plus the grouping keys it was read with. Never serialized.
struct Placed {
    leaf: TaxonLeaf,
    order: Option<String>,
    family: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

/// Build the taxon forest for a key.
pub fn map_taxa(species: &[LegacySpecies], images: &[LegacyImage], language: &str) -> Vec<Taxon> {
    let placed: Vec<Placed> = species
        .iter()
        .map(|s| Placed {
            leaf: TaxonLeaf {
                id: s.species_id.clone(),
                scientific_name: s.latin_name.clone(),
                vernacular_name: localized(language, s.local_name.clone().unwrap_or_default()),
                media: image_for(images, &s.species_id).map(MediaLinks::One),
            },
            order: non_empty(&s.order),
            family: non_empty(&s.family),
        })
        .collect();

    let mut taxa: Vec<Taxon> = placed
        .iter()
        .filter(|p| p.order.is_none())
        .map(|p| Taxon::Leaf(p.leaf.clone()))
        .collect();

    for order in distinct(placed.iter().filter_map(|p| p.order.as_deref())) {
        let in_order: Vec<&Placed> = placed
            .iter()
            .filter(|p| p.order.as_deref() == Some(order))
            .collect();

        let mut children: Vec<Taxon> = distinct(in_order.iter().filter_map(|p| p.family.as_deref()))
            .into_iter()
            .map(|family| {
                Taxon::Group(TaxonGroup {
                    id: family.to_lowercase(),
                    scientific_name: family.to_string(),
                    children: in_order
                        .iter()
                        .filter(|p| p.family.as_deref() == Some(family))
                        .map(|p| Taxon::Leaf(p.leaf.clone()))
                        .collect(),
                })
            })
            .collect();

        children.extend(
            in_order
                .iter()
                .filter(|p| p.family.is_none())
                .map(|p| Taxon::Leaf(p.leaf.clone())),
        );

        taxa.push(Taxon::Group(TaxonGroup {
            id: order.to_lowercase(),
            scientific_name: order.to_string(),
            children,
        }));
    }

    taxa
}

/// Distinct values in first-seen order.
fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen: Vec<&str> = Vec::new();
    for v in values {
        if !seen.contains(&v) {
            seen.push(v);
        }
    }
    seen
}
