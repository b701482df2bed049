//! Asset resolution and the CSP filter that decorates it.
//!
//! The host pipeline turns a set of attached libraries into concrete asset
//! records. [`AssetPolicyFilter`] wraps any [`AssetResolver`] and annotates the
//! script records it returns, either with the request nonce or by registering
//! file hashes, depending on the request's [`RequestPolicy`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::crypto::Nonce;
use crate::error::{Error, Result};
use crate::policy::{CspMode, RequestPolicy};

pub const NONCE_ATTRIBUTE: &str = "nonce";
pub const WHEREFROM_ATTRIBUTE: &str = "wherefrom";
/// Provenance marker left on every asset tagged by [`AssetPolicyFilter`].
pub const WHEREFROM_ASSET_RESOLVER: &str = "AssetResolver";

/// Kind of asset. Unrecognized kinds are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    File,
    External,
    Inline,
    Setting,
    #[serde(untagged)]
    Other(String),
}

/// One entry produced by the asset pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AssetType>,
    /// Locator for file/external assets, body for inline ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, String>>,
}

impl AssetRecord {
    pub fn file(locator: impl Into<String>) -> Self {
        Self {
            kind: Some(AssetType::File),
            data: Some(locator.into()),
            attributes: None,
        }
    }

    pub fn external(url: impl Into<String>) -> Self {
        Self {
            kind: Some(AssetType::External),
            data: Some(url.into()),
            attributes: None,
        }
    }

    pub fn inline(body: impl Into<String>) -> Self {
        Self {
            kind: Some(AssetType::Inline),
            data: Some(body.into()),
            attributes: None,
        }
    }

    pub fn is_kind(&self, kinds: &[AssetType]) -> bool {
        self.kind.as_ref().is_some_and(|kind| kinds.contains(kind))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .as_ref()
            .and_then(|attributes| attributes.get(name))
            .map(String::as_str)
    }
}

/// Script assets split by where they are emitted in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScriptGroups {
    pub header: Vec<AssetRecord>,
    pub footer: Vec<AssetRecord>,
}

/// What a response asks the pipeline for.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AttachedAssets {
    #[serde(default)]
    pub libraries: Vec<String>,
    /// Page settings emitted as a JSON data block ahead of the footer scripts.
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
}

impl AttachedAssets {
    pub fn libraries<I, S>(libraries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            libraries: libraries.into_iter().map(Into::into).collect(),
            settings: None,
        }
    }

    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = Some(settings);
        self
    }
}

pub trait AssetResolver {
    fn resolve_styles(&self, assets: &AttachedAssets, optimize: bool) -> Result<Vec<AssetRecord>>;

    fn resolve_scripts(&self, assets: &AttachedAssets, optimize: bool) -> Result<ScriptGroups>;
}

impl<R: AssetResolver + ?Sized> AssetResolver for &R {
    fn resolve_styles(&self, assets: &AttachedAssets, optimize: bool) -> Result<Vec<AssetRecord>> {
        (**self).resolve_styles(assets, optimize)
    }

    fn resolve_scripts(&self, assets: &AttachedAssets, optimize: bool) -> Result<ScriptGroups> {
        (**self).resolve_scripts(assets, optimize)
    }
}

/// Decorates a resolver so script assets carry CSP allow-listing.
///
/// Styles are passed through untouched. Scripts are only annotated when the
/// request sends a CSP header:
/// - nonce mode: `file` and `external` assets get `nonce` and `wherefrom`
///   attributes; other kinds are left alone.
/// - hash mode: `file` assets with a locator have their hash stored; assets
///   without a locator or derivable hash are skipped.
pub struct AssetPolicyFilter<'p, R> {
    inner: R,
    policy: &'p RequestPolicy,
}

impl<'p, R: AssetResolver> AssetPolicyFilter<'p, R> {
    pub fn new(inner: R, policy: &'p RequestPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<R: AssetResolver> AssetResolver for AssetPolicyFilter<'_, R> {
    fn resolve_styles(&self, assets: &AttachedAssets, optimize: bool) -> Result<Vec<AssetRecord>> {
        self.inner.resolve_styles(assets, optimize)
    }

    fn resolve_scripts(&self, assets: &AttachedAssets, optimize: bool) -> Result<ScriptGroups> {
        let mut groups = self.inner.resolve_scripts(assets, optimize)?;
        if !self.policy.sends_csp_header() {
            return Ok(groups);
        }

        match self.policy.mode() {
            CspMode::Nonce(nonce) => {
                add_nonce(&mut groups.header, nonce);
                add_nonce(&mut groups.footer, nonce);
            }
            CspMode::Hash => {
                add_hashes(&groups.header, self.policy)?;
                add_hashes(&groups.footer, self.policy)?;
            }
        }
        Ok(groups)
    }
}

fn add_nonce(assets: &mut [AssetRecord], nonce: &Nonce) {
    if assets.is_empty() {
        return;
    }

    let mut tagged = 0usize;
    for asset in assets
        .iter_mut()
        .filter(|asset| asset.is_kind(&[AssetType::File, AssetType::External]))
    {
        let attributes = asset.attributes.get_or_insert_with(BTreeMap::new);
        attributes.insert(NONCE_ATTRIBUTE.to_string(), nonce.to_string());
        attributes.insert(
            WHEREFROM_ATTRIBUTE.to_string(),
            WHEREFROM_ASSET_RESOLVER.to_string(),
        );
        tagged += 1;
    }
    tracing::trace!(tagged, "tagged script assets with request nonce");
}

fn add_hashes(assets: &[AssetRecord], policy: &RequestPolicy) -> Result<()> {
    if assets.is_empty() {
        return Ok(());
    }

    for asset in assets.iter().filter(|asset| asset.is_kind(&[AssetType::File])) {
        let Some(locator) = asset.data.as_deref() else {
            continue;
        };
        if let Some(hash) = policy.hash_from_locator(locator)? {
            policy.store_hash(&hash);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Header,
    #[default]
    Footer,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LibraryScript {
    #[serde(default)]
    pub scope: Scope,
    #[serde(flatten)]
    pub asset: AssetRecord,
}

/// A named bundle of scripts and styles, optionally depending on others.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Library {
    #[serde(default)]
    pub js: Vec<LibraryScript>,
    #[serde(default)]
    pub css: Vec<AssetRecord>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Resolver over a registry of named libraries.
///
/// Libraries are expanded dependencies-first and each library is emitted
/// once. With `optimize`, later assets repeating an earlier locator are
/// dropped.
#[derive(Debug, Clone, Default)]
pub struct LibraryAssetResolver {
    libraries: BTreeMap<String, Library>,
}

impl LibraryAssetResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load definitions from a JSON object keyed by library name.
    pub fn from_json(json: &str) -> Result<Self> {
        let libraries: BTreeMap<String, Library> = serde_json::from_str(json)?;
        Ok(Self { libraries })
    }

    pub fn insert(&mut self, name: impl Into<String>, library: Library) {
        self.libraries.insert(name.into(), library);
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    fn ordered(&self, assets: &AttachedAssets) -> Result<Vec<&Library>> {
        let mut visited = BTreeSet::new();
        let mut ordered = Vec::new();
        for name in &assets.libraries {
            self.visit(name, &mut visited, &mut ordered)?;
        }
        Ok(ordered)
    }

    fn visit<'a>(
        &'a self,
        name: &str,
        visited: &mut BTreeSet<String>,
        ordered: &mut Vec<&'a Library>,
    ) -> Result<()> {
        if !visited.insert(name.to_string()) {
            return Ok(());
        }
        let library = self
            .libraries
            .get(name)
            .ok_or_else(|| Error::UnknownLibrary(name.to_string()))?;
        for dependency in &library.dependencies {
            self.visit(dependency, visited, ordered)?;
        }
        ordered.push(library);
        Ok(())
    }
}

impl AssetResolver for LibraryAssetResolver {
    fn resolve_styles(&self, assets: &AttachedAssets, optimize: bool) -> Result<Vec<AssetRecord>> {
        let mut seen = BTreeSet::new();
        Ok(self
            .ordered(assets)?
            .into_iter()
            .flat_map(|library| library.css.iter())
            .filter(|asset| !optimize || first_occurrence(asset, &mut seen))
            .cloned()
            .collect())
    }

    fn resolve_scripts(&self, assets: &AttachedAssets, optimize: bool) -> Result<ScriptGroups> {
        let mut seen = BTreeSet::new();
        let mut groups = ScriptGroups::default();

        if let Some(settings) = &assets.settings {
            groups.footer.push(AssetRecord {
                kind: Some(AssetType::Setting),
                data: Some(settings.to_string()),
                attributes: None,
            });
        }

        for script in self
            .ordered(assets)?
            .into_iter()
            .flat_map(|library| library.js.iter())
        {
            if optimize && !first_occurrence(&script.asset, &mut seen) {
                continue;
            }
            match script.scope {
                Scope::Header => groups.header.push(script.asset.clone()),
                Scope::Footer => groups.footer.push(script.asset.clone()),
            }
        }
        Ok(groups)
    }
}

fn first_occurrence(asset: &AssetRecord, seen: &mut BTreeSet<String>) -> bool {
    match (&asset.kind, &asset.data) {
        (Some(AssetType::File | AssetType::External), Some(locator)) => {
            seen.insert(locator.clone())
        }
        _ => true,
    }
}
