//! Theme loading.
//!
//! A theme names the dice it ships, the mesh set holding their colliders and
//! how its materials are built. Loads are deduplicated: concurrent requests
//! for a theme share one in-flight fetch, and a mesh set is registered with
//! the collider registry once no matter how many themes use it.

use crate::error::{DiceError, Result};
use crate::events::{DiceEvent, EventHub};
use async_trait::async_trait;
use dicebox_physics::{ColliderRegistry, DieType, MeshBundle};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MESH_NAME: &str = "smoothDice";
pub const DEFAULT_MATERIAL: &str = "standard";

fn default_dice() -> Vec<String> {
    ["d4", "d6", "d8", "d10", "d12", "d20", "d100"]
        .iter()
        .map(|d| d.to_string())
        .collect()
}

/// Resolved description of one theme
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeData {
    pub theme: String,
    /// Die keys (`"d6"`, `"dfate"`) the theme has meshes for
    pub dice_available: Vec<String>,
    pub mesh_name: String,
    /// Mesh bundle path, relative to the asset base
    pub mesh_file: String,
    pub material_type: String,
    /// d4 results read from the face resting on the floor
    pub d4_face_down: bool,
}

impl ThemeData {
    /// Theme using the stock mesh set and every standard die
    pub fn standard(theme: impl Into<String>) -> Self {
        Self {
            theme: theme.into(),
            dice_available: default_dice(),
            mesh_name: DEFAULT_MESH_NAME.to_string(),
            mesh_file: format!("models/{DEFAULT_MESH_NAME}.json"),
            material_type: DEFAULT_MATERIAL.to_string(),
            d4_face_down: true,
        }
    }

    pub fn has_die(&self, die_type: DieType) -> bool {
        let key = die_type.to_string();
        self.dice_available.iter().any(|d| d.eq_ignore_ascii_case(&key))
    }

    /// Parse a `theme.config.json` document
    pub fn from_config_json(theme: &str, json: &str) -> Result<Self> {
        let file: ThemeConfigFile =
            serde_json::from_str(json).map_err(|err| DiceError::ThemeLoad {
                theme: theme.to_string(),
                reason: err.to_string(),
            })?;
        Ok(file.resolve(theme))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThemeConfigFile {
    dice_available: Option<Vec<String>>,
    mesh_name: Option<String>,
    mesh_file: Option<String>,
    #[serde(default)]
    material: MaterialConfig,
    d4_face_down: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct MaterialConfig {
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl ThemeConfigFile {
    fn resolve(self, theme: &str) -> ThemeData {
        let standard = ThemeData::standard(theme);
        let mesh_name = match (self.mesh_name, &self.mesh_file) {
            (Some(name), _) => name,
            (None, Some(file)) => {
                tracing::warn!(theme, "theme has a meshFile but no meshName");
                Path::new(file)
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or(DEFAULT_MESH_NAME)
                    .to_string()
            }
            (None, None) => standard.mesh_name.clone(),
        };
        let mesh_file = match self.mesh_file {
            Some(file) => format!("themes/{theme}/{file}"),
            None => format!("models/{mesh_name}.json"),
        };

        ThemeData {
            theme: theme.to_string(),
            dice_available: self.dice_available.unwrap_or(standard.dice_available),
            mesh_name,
            mesh_file,
            material_type: self.material.kind.unwrap_or(standard.material_type),
            d4_face_down: self.d4_face_down.unwrap_or(true),
        }
    }
}

/// Where theme descriptions and collider bundles come from
#[async_trait]
pub trait ThemeSource: Send + Sync {
    async fn load_theme(&self, theme: &str, asset_base: &str) -> Result<ThemeData>;

    async fn load_meshes(&self, theme: &ThemeData, asset_base: &str) -> Result<MeshBundle>;
}

/// Reads themes from an asset directory on disk:
/// `<root>/<asset_base>/themes/<theme>/theme.config.json`
#[derive(Debug, Clone)]
pub struct FileThemeSource {
    root: PathBuf,
}

impl FileThemeSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn base(&self, asset_base: &str) -> PathBuf {
        self.root.join(asset_base.trim_start_matches('/'))
    }
}

async fn read_text(theme: &str, path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|err| DiceError::ThemeLoad {
            theme: theme.to_string(),
            reason: format!("{}: {err}", path.display()),
        })
}

#[async_trait]
impl ThemeSource for FileThemeSource {
    async fn load_theme(&self, theme: &str, asset_base: &str) -> Result<ThemeData> {
        let path = self
            .base(asset_base)
            .join("themes")
            .join(theme)
            .join("theme.config.json");
        let json = read_text(theme, &path).await?;
        ThemeData::from_config_json(theme, &json)
    }

    async fn load_meshes(&self, theme: &ThemeData, asset_base: &str) -> Result<MeshBundle> {
        let path = self.base(asset_base).join(&theme.mesh_file);
        let json = read_text(&theme.theme, &path).await?;
        serde_json::from_str(&json).map_err(|err| DiceError::ThemeLoad {
            theme: theme.theme.clone(),
            reason: err.to_string(),
        })
    }
}

/// In-memory themes, for embedding and tests
#[derive(Default)]
pub struct StaticThemeSource {
    themes: HashMap<String, (ThemeData, MeshBundle)>,
    latency: Option<Duration>,
    loads: AtomicUsize,
}

impl StaticThemeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_theme(mut self, data: ThemeData, meshes: MeshBundle) -> Self {
        self.themes.insert(data.theme.clone(), (data, meshes));
        self
    }

    /// Delay every load, to exercise in-flight deduplication
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of `load_theme` calls served
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThemeSource for StaticThemeSource {
    async fn load_theme(&self, theme: &str, _asset_base: &str) -> Result<ThemeData> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.themes
            .get(theme)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| DiceError::ThemeLoad {
                theme: theme.to_string(),
                reason: "no such theme".to_string(),
            })
    }

    async fn load_meshes(&self, theme: &ThemeData, _asset_base: &str) -> Result<MeshBundle> {
        self.themes
            .get(&theme.theme)
            .map(|(_, meshes)| meshes.clone())
            .ok_or_else(|| DiceError::ThemeLoad {
                theme: theme.theme.clone(),
                reason: "no such theme".to_string(),
            })
    }
}

type ThemeLoad = Shared<BoxFuture<'static, std::result::Result<Arc<ThemeData>, String>>>;

struct ThemeCacheInner {
    source: Arc<dyn ThemeSource>,
    registry: Arc<ColliderRegistry>,
    events: EventHub,
    loaded: RwLock<HashMap<String, Arc<ThemeData>>>,
    in_flight: Mutex<HashMap<String, ThemeLoad>>,
}

/// Loaded themes plus the loads still in flight
#[derive(Clone)]
pub struct ThemeCache {
    inner: Arc<ThemeCacheInner>,
}

impl ThemeCache {
    pub fn new(
        source: Arc<dyn ThemeSource>,
        registry: Arc<ColliderRegistry>,
        events: EventHub,
    ) -> Self {
        Self {
            inner: Arc::new(ThemeCacheInner {
                source,
                registry,
                events,
                loaded: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Already-loaded theme, without waiting
    pub fn get(&self, theme: &str) -> Option<Arc<ThemeData>> {
        self.inner.loaded.read().get(theme).cloned()
    }

    pub fn is_loaded(&self, theme: &str) -> bool {
        self.inner.loaded.read().contains_key(theme)
    }

    /// Load a theme and its colliders, joining a load already in flight.
    ///
    /// A failed load is not cached; the next request tries again.
    pub async fn load(&self, theme: &str, asset_base: &str) -> Result<Arc<ThemeData>> {
        if let Some(data) = self.get(theme) {
            return Ok(data);
        }

        let load = {
            let mut in_flight = self.inner.in_flight.lock();
            in_flight
                .entry(theme.to_string())
                .or_insert_with(|| {
                    let inner = self.inner.clone();
                    let theme = theme.to_string();
                    let asset_base = asset_base.to_string();
                    async move {
                        inner
                            .fetch(&theme, &asset_base)
                            .await
                            .map_err(|err| err.to_string())
                    }
                    .boxed()
                    .shared()
                })
                .clone()
        };

        let result = load.await;
        self.inner.in_flight.lock().remove(theme);
        result.map_err(|reason| DiceError::ThemeLoad {
            theme: theme.to_string(),
            reason,
        })
    }
}

impl ThemeCacheInner {
    async fn fetch(&self, theme: &str, asset_base: &str) -> Result<Arc<ThemeData>> {
        tracing::info!(theme, "loading theme");
        let data = self.source.load_theme(theme, asset_base).await?;

        if !self.registry.has_mesh_set(&data.mesh_name) {
            let meshes = self.source.load_meshes(&data, asset_base).await?;
            self.registry.load_models(&data.mesh_name, &meshes)?;
        }

        let data = Arc::new(data);
        self.loaded
            .write()
            .insert(theme.to_string(), data.clone());
        tracing::info!(theme, mesh_set = %data.mesh_name, "theme loaded");
        self.events.publish(DiceEvent::ThemeLoaded(theme.to_string()));
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicebox_physics::fixtures::cube_bundle;

    fn cache(source: StaticThemeSource) -> (ThemeCache, Arc<StaticThemeSource>, Arc<ColliderRegistry>) {
        let source = Arc::new(source);
        let registry = Arc::new(ColliderRegistry::new());
        let cache = ThemeCache::new(source.clone(), registry.clone(), EventHub::default());
        (cache, source, registry)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_loads_share_one_fetch() {
        let (cache, source, registry) = cache(
            StaticThemeSource::new()
                .with_theme(ThemeData::standard("default"), cube_bundle(&[DieType::D6]))
                .with_latency(Duration::from_millis(50)),
        );

        let (a, b) = tokio::join!(
            cache.load("default", "/assets/"),
            cache.load("default", "/assets/")
        );
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(source.load_count(), 1);
        assert!(registry.get_collider(DieType::D6, DEFAULT_MESH_NAME).is_some());

        cache.load("default", "/assets/").await.unwrap();
        assert_eq!(source.load_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let (cache, source, _) = cache(StaticThemeSource::new());
        assert!(matches!(
            cache.load("missing", "/").await,
            Err(DiceError::ThemeLoad { .. })
        ));
        assert!(cache.load("missing", "/").await.is_err());
        assert_eq!(source.load_count(), 2);
        assert!(!cache.is_loaded("missing"));
    }

    #[tokio::test]
    async fn test_missing_face_map_fails_theme() {
        let mut bundle = cube_bundle(&[DieType::D6]);
        bundle.collider_face_map = None;
        let (cache, _, registry) =
            cache(StaticThemeSource::new().with_theme(ThemeData::standard("bare"), bundle));

        let err = cache.load("bare", "/").await.unwrap_err();
        assert!(matches!(err, DiceError::ThemeLoad { .. }));
        assert!(!registry.has_mesh_set(DEFAULT_MESH_NAME));
    }

    #[test]
    fn test_config_file_defaults() {
        let data = ThemeData::from_config_json(
            "rock",
            r#"{"meshFile": "rockDice.json", "material": {"type": "color"}}"#,
        )
        .unwrap();
        assert_eq!(data.mesh_name, "rockDice");
        assert_eq!(data.mesh_file, "themes/rock/rockDice.json");
        assert_eq!(data.material_type, "color");
        assert!(data.has_die(DieType::D100));
        assert!(!data.has_die(DieType::Fate));
        assert!(data.d4_face_down);
    }

    #[tokio::test]
    async fn test_file_source_reads_asset_tree() {
        let dir = tempfile::tempdir().unwrap();
        let theme_dir = dir.path().join("assets/dice-box/themes/default");
        std::fs::create_dir_all(&theme_dir).unwrap();
        std::fs::create_dir_all(dir.path().join("assets/dice-box/models")).unwrap();
        std::fs::write(
            theme_dir.join("theme.config.json"),
            r#"{"diceAvailable": ["d6"], "meshName": "smoothDice"}"#,
        )
        .unwrap();
        let bundle = cube_bundle(&[DieType::D6]);
        let faces = bundle.collider_face_map.clone().unwrap();
        let mesh = &bundle.meshes[0];
        let json = serde_json::json!({
            "meshes": [{
                "name": mesh.name,
                "positions": mesh.positions,
                "indices": mesh.indices,
                "scaling": mesh.scaling,
            }],
            "colliderFaceMap": faces,
        });
        std::fs::write(
            dir.path().join("assets/dice-box/models/smoothDice.json"),
            json.to_string(),
        )
        .unwrap();

        let source = Arc::new(FileThemeSource::new(dir.path()));
        let registry = Arc::new(ColliderRegistry::new());
        let cache = ThemeCache::new(source, registry.clone(), EventHub::default());
        let data = cache.load("default", "/assets/dice-box/").await.unwrap();

        assert_eq!(data.dice_available, vec!["d6".to_string()]);
        assert!(registry.get_collider(DieType::D6, "smoothDice").is_some());
    }
}
