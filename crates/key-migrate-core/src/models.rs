//! Data models for both ends of the migration.
//!
//! [`LegacyKey`] mirrors the flat, array-shaped record returned by the old
//! key-authoring API. [`Document`] is the nested target representation that
//! is validated against the JSON schema and later materialized into the
//! entity store.
//!
//! Legacy identifiers arrive as numbers or strings depending on the record;
//! they are normalized to strings on deserialization so they can be compared
//! against document ids directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Language code → text.
pub type LocalizedText = BTreeMap<String, String>;

/// Build a single-language [`LocalizedText`].
pub fn localized(language: &str, text: impl Into<String>) -> LocalizedText {
    let mut map = LocalizedText::new();
    map.insert(language.to_string(), text.into());
    map
}

// ═══════════════════════════════════════════════════════════════════════
// Legacy record
// ═══════════════════════════════════════════════════════════════════════

/// A key as returned by `GET {legacyApiBase}/keys/get/{keyWeb}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyKey {
    #[serde(default)]
    pub key_web: Option<String>,
    pub name: String,
    #[serde(default)]
    pub key_info: Option<String>,
    #[serde(default)]
    pub version: Value,
    pub key_status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: Vec<LegacyImage>,
    #[serde(default)]
    pub key_image: Option<String>,
    #[serde(default)]
    pub key_image_info: Option<String>,
    #[serde(rename = "trait", default, deserialize_with = "null_as_default")]
    pub traits: Vec<LegacyTrait>,
    #[serde(rename = "value", default, deserialize_with = "null_as_default")]
    pub values: Vec<LegacyValue>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub species: Vec<LegacySpecies>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sp_has_value: Vec<LegacySpeciesValue>,
}

/// An image attached to a species or a trait value (matched by `type_id`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyImage {
    /// Source URL; some legacy rows carry `null` here.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "optional_id")]
    pub type_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTrait {
    #[serde(deserialize_with = "string_or_number")]
    pub trait_id: String,
    #[serde(default, deserialize_with = "optional_id")]
    pub trait_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyValue {
    #[serde(deserialize_with = "string_or_number")]
    pub value_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub trait_id: String,
    #[serde(default, deserialize_with = "optional_id")]
    pub value_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySpecies {
    #[serde(deserialize_with = "string_or_number")]
    pub species_id: String,
    #[serde(default)]
    pub latin_name: Option<String>,
    #[serde(default)]
    pub local_name: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
}

/// A species-has-value fact.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySpeciesValue {
    #[serde(deserialize_with = "string_or_number")]
    pub sp_has_value_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub sp_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub value_id: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Int(n) => n.to_string(),
            RawId::Float(f) => f.to_string(),
            RawId::Str(s) => s,
            RawId::Bool(b) => b.to_string(),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    RawId::deserialize(d).map(String::from)
}

fn optional_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(d)?.map(String::from))
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

// ═══════════════════════════════════════════════════════════════════════
// Target document
// ═══════════════════════════════════════════════════════════════════════

/// The schema-validated target representation of a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub identifier: String,
    pub title: LocalizedText,
    pub description: LocalizedText,
    pub language: Vec<String>,
    pub license: String,
    pub creator: String,
    pub created: String,
    pub version: Value,
    pub status: String,
    pub last_modified: String,
    #[serde(default)]
    pub media_elements: Vec<MediaElement>,
    /// Media owned by the key itself rather than any taxon or state.
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub taxa: Vec<Taxon>,
    #[serde(default)]
    pub statements: Vec<Statement>,
}

impl Document {
    /// The primary language (first entry of `language`).
    pub fn primary_language(&self) -> Option<&str> {
        self.language.first().map(String::as_str)
    }

    pub fn media_element(&self, id: &str) -> Option<&MediaElement> {
        self.media_elements.iter().find(|e| e.id == id)
    }
}

/// A document-level reference to a source media URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaElement {
    pub id: String,
    pub media_element: MediaElementBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaElementBody {
    pub media_file: MediaFile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFile {
    pub url: String,
}

impl MediaElement {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            media_element: MediaElementBody {
                media_file: MediaFile { url: url.into() },
            },
        }
    }

    pub fn url(&self) -> &str {
        &self.media_element.media_file.url
    }
}

/// Media link on a taxon or character state.
///
/// Freshly transformed documents carry a single media id; materialized
/// documents carry a list of persisted media ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaLinks {
    One(String),
    Many(Vec<String>),
}

impl MediaLinks {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            MediaLinks::One(id) => vec![id.clone()],
            MediaLinks::Many(ids) => ids.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub title: LocalizedText,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub states: Vec<CharacterState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterState {
    pub id: String,
    pub title: LocalizedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaLinks>,
}

/// A node of the taxonomic tree.
///
/// Group nodes (order, family) always carry `children`; leaves never do.
/// Deserialization tries the group shape first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Taxon {
    Group(TaxonGroup),
    Leaf(TaxonLeaf),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonGroup {
    pub id: String,
    pub scientific_name: String,
    pub children: Vec<Taxon>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonLeaf {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub vernacular_name: LocalizedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaLinks>,
}

impl Taxon {
    pub fn id(&self) -> &str {
        match self {
            Taxon::Group(g) => &g.id,
            Taxon::Leaf(l) => &l.id,
        }
    }

    pub fn children(&self) -> &[Taxon] {
        match self {
            Taxon::Group(g) => &g.children,
            Taxon::Leaf(_) => &[],
        }
    }

    pub fn media(&self) -> Option<&MediaLinks> {
        match self {
            Taxon::Group(_) => None,
            Taxon::Leaf(l) => l.media.as_ref(),
        }
    }
}

/// Depth-first, pre-order flattening of a taxon forest.
///
/// Every node is visited, group nodes included, before its children.
pub fn flatten_taxa(taxa: &[Taxon]) -> Vec<&Taxon> {
    let mut out = Vec::new();
    collect_taxa(taxa, &mut out);
    out
}

fn collect_taxa<'a>(taxa: &'a [Taxon], out: &mut Vec<&'a Taxon>) {
    for taxon in taxa {
        out.push(taxon);
        collect_taxa(taxon.children(), out);
    }
}

/// Mutable counterpart of [`flatten_taxa`]; visits nodes in the same order.
pub fn for_each_taxon_mut(taxa: &mut [Taxon], f: &mut impl FnMut(&mut Taxon)) {
    for taxon in taxa.iter_mut() {
        f(taxon);
        if let Taxon::Group(group) = taxon {
            for_each_taxon_mut(&mut group.children, f);
        }
    }
}

/// A (taxon, character, state) fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    pub id: String,
    pub taxon_id: String,
    pub character_id: String,
    pub value: String,
}
