//! Value types exchanged with the query backend.
//!
//! A locator resolves to [`LocatorMatch`]es: either a raw [`FeatureMatch`] as
//! returned by `__MAPGRAB__.query()` or a [`MergedMatch`] built locally from
//! several of them. Consumers only rely on the [`MatchShape`] capability.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::geometry::{BoundingBox, ScreenPoint};

/// Shared capability of everything a locator can resolve to
pub trait MatchShape {
    /// Display rectangle of the match
    fn rect(&self) -> &BoundingBox;

    /// Ordered pixel positions that hit the match
    fn interaction_points(&self) -> &[ScreenPoint];
}

/// One raw result from the query backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureMatch {
    /// Feature identifier (absent for features without an id)
    #[serde(default, deserialize_with = "stringified_opt")]
    pub feature_id: Option<String>,
    /// Source identifier
    #[serde(default)]
    pub source_id: String,
    /// Style layer identifier
    #[serde(default)]
    pub layer_id: String,
    /// Owning map identifier
    #[serde(default)]
    pub map_id: String,
    /// Whether the feature is currently drawn
    #[serde(default)]
    pub is_visible: bool,
    /// Feature properties, stringified
    #[serde(default, deserialize_with = "stringified_map")]
    pub properties: BTreeMap<String, String>,
    /// Pixel positions that hit this feature
    #[serde(default)]
    pub interaction_points: Vec<ScreenPoint>,
    /// Display rectangle
    pub rect: BoundingBox,
}

impl FeatureMatch {
    /// Create a visible match with no properties
    #[must_use]
    pub fn new(
        layer_id: impl Into<String>,
        map_id: impl Into<String>,
        rect: BoundingBox,
    ) -> Self {
        Self {
            feature_id: None,
            source_id: String::new(),
            layer_id: layer_id.into(),
            map_id: map_id.into(),
            is_visible: true,
            properties: BTreeMap::new(),
            interaction_points: Vec::new(),
            rect,
        }
    }

    /// Set the feature identifier
    #[must_use]
    pub fn with_feature_id(mut self, id: impl Into<String>) -> Self {
        self.feature_id = Some(id.into());
        self
    }

    /// Set the source identifier
    #[must_use]
    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    /// Set the visibility flag
    #[must_use]
    pub const fn with_visible(mut self, visible: bool) -> Self {
        self.is_visible = visible;
        self
    }

    /// Add a property
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Append an interaction point
    #[must_use]
    pub fn with_interaction_point(mut self, point: ScreenPoint) -> Self {
        self.interaction_points.push(point);
        self
    }

    /// Look up a property value
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

impl MatchShape for FeatureMatch {
    fn rect(&self) -> &BoundingBox {
        &self.rect
    }

    fn interaction_points(&self) -> &[ScreenPoint] {
        &self.interaction_points
    }
}

/// Union of several feature matches sharing a merge key
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedMatch {
    /// Bounding union of every constituent rectangle
    pub rect: BoundingBox,
    /// Concatenated interaction points, in encounter order
    pub interaction_points: Vec<ScreenPoint>,
    /// Constituent features, in encounter order
    pub features: Vec<FeatureMatch>,
}

impl MergedMatch {
    /// Merged matches carry no properties
    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, String> {
        static EMPTY: BTreeMap<String, String> = BTreeMap::new();
        &EMPTY
    }
}

impl MatchShape for MergedMatch {
    fn rect(&self) -> &BoundingBox {
        &self.rect
    }

    fn interaction_points(&self) -> &[ScreenPoint] {
        &self.interaction_points
    }
}

/// What a locator resolves to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LocatorMatch {
    /// A single backend result
    Single(FeatureMatch),
    /// Several backend results collapsed into one
    Merged(MergedMatch),
}

impl LocatorMatch {
    /// Merge two matches: union of rectangles, concatenated points
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        let rect = self.rect().union(other.rect());
        let mut interaction_points = self.interaction_points().to_vec();
        interaction_points.extend_from_slice(other.interaction_points());
        let mut features = self.into_features();
        features.extend(other.into_features());
        Self::Merged(MergedMatch {
            rect,
            interaction_points,
            features,
        })
    }

    /// Constituent feature matches
    #[must_use]
    pub fn features(&self) -> &[FeatureMatch] {
        match self {
            Self::Single(feature) => std::slice::from_ref(feature),
            Self::Merged(merged) => &merged.features,
        }
    }

    /// Distinct layer ids spanned by the match, in encounter order
    #[must_use]
    pub fn layer_ids(&self) -> Vec<String> {
        distinct(self.features().iter().map(|f| f.layer_id.as_str()))
    }

    /// Distinct map ids spanned by the match, in encounter order
    #[must_use]
    pub fn map_ids(&self) -> Vec<String> {
        distinct(self.features().iter().map(|f| f.map_id.as_str()))
    }

    /// Properties of a single match; empty for merged matches
    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, String> {
        match self {
            Self::Single(feature) => &feature.properties,
            Self::Merged(merged) => merged.properties(),
        }
    }

    /// Whether this match was built by merging
    #[must_use]
    pub const fn is_merged(&self) -> bool {
        matches!(self, Self::Merged(_))
    }

    fn into_features(self) -> Vec<FeatureMatch> {
        match self {
            Self::Single(feature) => vec![feature],
            Self::Merged(merged) => merged.features,
        }
    }
}

impl MatchShape for LocatorMatch {
    fn rect(&self) -> &BoundingBox {
        match self {
            Self::Single(feature) => feature.rect(),
            Self::Merged(merged) => merged.rect(),
        }
    }

    fn interaction_points(&self) -> &[ScreenPoint] {
        match self {
            Self::Single(feature) => feature.interaction_points(),
            Self::Merged(merged) => merged.interaction_points(),
        }
    }
}

impl From<FeatureMatch> for LocatorMatch {
    fn from(feature: FeatureMatch) -> Self {
        Self::Single(feature)
    }
}

/// Layout visibility of a style layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerVisibility {
    /// Layer is drawn
    #[default]
    Visible,
    /// Layer is hidden
    None,
}

impl std::fmt::Display for LayerVisibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Visible => write!(f, "visible"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Before/after visibility of one layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationState {
    /// Value before the mutation
    pub from: LayerVisibility,
    /// Value applied by the mutation
    pub to: LayerVisibility,
}

impl MutationState {
    /// Create a new transition
    #[must_use]
    pub const fn new(from: LayerVisibility, to: LayerVisibility) -> Self {
        Self { from, to }
    }

    /// The transition that undoes this one
    #[must_use]
    pub const fn inverse(&self) -> Self {
        Self {
            from: self.to,
            to: self.from,
        }
    }
}

/// Per-layer record of an `exposeLayers` mutation, enough to revert it.
///
/// Owned by the caller between `expose_layers` and `revert_expose_layers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationLedger(BTreeMap<String, MutationState>);

impl MutationLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transition for a layer
    pub fn record(&mut self, layer_id: impl Into<String>, state: MutationState) {
        self.0.insert(layer_id.into(), state);
    }

    /// Transition recorded for a layer
    #[must_use]
    pub fn get(&self, layer_id: &str) -> Option<&MutationState> {
        self.0.get(layer_id)
    }

    /// Number of mutated layers
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was mutated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(layer_id, transition)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MutationState)> {
        self.0.iter().map(|(id, state)| (id.as_str(), state))
    }
}

impl FromIterator<(String, MutationState)> for MutationLedger {
    fn from_iter<I: IntoIterator<Item = (String, MutationState)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Which layers `exposeLayers` hides
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LayersToHide {
    /// Every layer that is not exposed
    #[default]
    AllOther,
    /// Only the listed layers
    Only(Vec<String>),
}

impl LayersToHide {
    /// Hide only the given layers
    #[must_use]
    pub fn only<I, S>(layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(layers.into_iter().map(Into::into).collect())
    }

    /// Whether a non-exposed layer should be hidden
    #[must_use]
    pub fn hides(&self, layer_id: &str) -> bool {
        match self {
            Self::AllOther => true,
            Self::Only(layers) => layers.iter().any(|l| l == layer_id),
        }
    }
}

impl Serialize for LayersToHide {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::AllOther => serializer.serialize_str("allOther"),
            Self::Only(layers) => layers.serialize(serializer),
        }
    }
}

fn distinct<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        if !out.iter().any(|seen| seen == id) {
            out.push(id.to_string());
        }
    }
    out
}

fn stringify(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn stringified_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(stringify))
}

fn stringified_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| stringify(v).map(|v| (k, v)))
        .collect())
}
