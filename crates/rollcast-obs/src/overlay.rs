//! Overlay resource manager.
//!
//! Reconciles one named browser source per chat command against the current
//! OBS state and toggles its visibility. Reconciliation is idempotent: after
//! any `ensure_source` call the source is sized to the *current* canvas,
//! bound to exactly one locked scene item with a full-canvas scale-inner
//! transform, and carries exactly one chroma-key filter.
//!
//! Sources are created lazily on first use, persist for the process
//! lifetime, and are only ever disabled, never deleted. `show`/`hide` are
//! the sole place scene-item enabled flags are touched.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::{CanvasSize, ObsApi};
use crate::error::ObsError;

/// Base URL of the external dice-animation page.
const DICE_RENDER_URL: &str = "https://dice.bee.ac/";

/// Input kind of the managed sources.
const BROWSER_SOURCE_KIND: &str = "browser_source";

/// Name and kind of the canonical filter on every managed source.
const CHROMA_FILTER_NAME: &str = "Chroma Key";
const CHROMA_FILTER_KIND: &str = "chroma_key_filter_v2";

/// Hex colors for the rendered dice, labels, and chroma background.
#[derive(Debug, Clone)]
pub struct DisplayColors {
    pub dice: String,
    pub label: String,
    pub chroma: String,
}

/// Manages the overlay browser sources, one per command.
pub struct OverlayManager {
    api: Arc<dyn ObsApi>,
    scene: String,
    colors: DisplayColors,
    /// Scene items reconciled so far, by source name. Used only to hide
    /// everything at shutdown; lookups during dispatch always re-query OBS.
    managed: Mutex<HashMap<String, u64>>,
}

impl OverlayManager {
    pub fn new(api: Arc<dyn ObsApi>, scene: impl Into<String>, colors: DisplayColors) -> Self {
        Self {
            api,
            scene: scene.into(),
            colors,
            managed: Mutex::new(HashMap::new()),
        }
    }

    /// Deterministic source name for a command.
    pub fn source_name(command: &str) -> String {
        format!("Dice_!{command}")
    }

    /// Idempotent reconciliation of one overlay source.
    ///
    /// Creates the browser source and its scene item if missing, then
    /// unconditionally resets size, transform, lock state, and filters
    /// against the current canvas dimensions. Returns the scene-item id.
    pub async fn ensure_source(&self, name: &str) -> Result<u64, ObsError> {
        let (item_id, _) = self.reconcile(name).await?;
        Ok(item_id)
    }

    /// Point the source at the dice-animation page for one roll outcome,
    /// reconciling it first. Returns the scene-item id for `show`/`hide`.
    pub async fn set_dice_display(
        &self,
        name: &str,
        faces: u32,
        values: &[String],
    ) -> Result<u64, ObsError> {
        let (item_id, canvas) = self.reconcile(name).await?;

        let url = dice_render_url(&self.colors, values.len() as u32, faces, values);
        let mut settings = browser_settings(canvas);
        settings["url"] = Value::String(url);
        self.api.set_input_settings(name, settings).await?;

        Ok(item_id)
    }

    /// Make the scene item visible.
    pub async fn show(&self, item_id: u64) -> Result<(), ObsError> {
        self.api
            .set_scene_item_enabled(&self.scene, item_id, true)
            .await
    }

    /// Hide the scene item.
    pub async fn hide(&self, item_id: u64) -> Result<(), ObsError> {
        self.api
            .set_scene_item_enabled(&self.scene, item_id, false)
            .await
    }

    /// Hide every source this manager has reconciled. Called at shutdown;
    /// failures are logged, not propagated.
    pub async fn hide_all(&self) {
        let managed = self.managed.lock().await;
        for (name, item_id) in managed.iter() {
            if let Err(e) = self.hide(*item_id).await {
                warn!(source = %name, "failed to hide overlay source at shutdown: {e}");
            }
        }
    }

    /// The reconciliation sequence behind `ensure_source`.
    async fn reconcile(&self, name: &str) -> Result<(u64, CanvasSize), ObsError> {
        // Canvas size must be fresh on every call; the user can change the
        // output resolution between rolls.
        let canvas = self.api.get_video_settings().await?;
        let settings = browser_settings(canvas);

        let inputs = self.api.list_inputs().await?;
        if !inputs.iter().any(|i| i == name) {
            debug!(source = %name, "creating overlay browser source");
            self.api
                .create_input(&self.scene, name, BROWSER_SOURCE_KIND, settings.clone(), false)
                .await?;
        }

        // Unconditional reset so an existing source picks up canvas changes.
        self.api.set_input_settings(name, settings).await?;

        let items = self.api.list_scene_items(&self.scene).await?;
        let item_id = match items.iter().find(|i| i.source_name == name) {
            Some(item) => item.id,
            None => {
                debug!(source = %name, "creating scene item for overlay source");
                self.api
                    .create_scene_item(&self.scene, name, false)
                    .await?
            }
        };

        self.api
            .set_scene_item_transform(&self.scene, item_id, full_canvas_transform(canvas))
            .await?;
        self.api
            .set_scene_item_locked(&self.scene, item_id, true)
            .await?;

        // Strip every filter, then re-add the one canonical chroma key.
        for filter in self.api.list_filters(name).await? {
            self.api.remove_filter(name, &filter).await?;
        }
        self.api
            .create_filter(
                name,
                CHROMA_FILTER_NAME,
                CHROMA_FILTER_KIND,
                json!({
                    "key_color_type": "custom",
                    "key_color": chroma_color_int(&self.colors.chroma)?,
                }),
            )
            .await?;

        self.managed.lock().await.insert(name.to_string(), item_id);

        Ok((item_id, canvas))
    }
}

/// Default settings for a managed browser source at the given canvas size.
fn browser_settings(canvas: CanvasSize) -> Value {
    json!({
        "url": "",
        "width": canvas.width,
        "height": canvas.height,
        "css": "",
        "reroute_audio": false,
        "shutdown": true,
    })
}

/// Full-canvas transform: scale-inner bounds, zero crop, origin (0,0),
/// unit scale.
///
/// Only writable fields are sent. `width`/`height` and
/// `sourceWidth`/`sourceHeight` are read-only in SetSceneItemTransform;
/// the rendered size is governed by the bounds box and the browser
/// source's own width/height settings.
fn full_canvas_transform(canvas: CanvasSize) -> Value {
    json!({
        "boundsAlignment": 0,
        "boundsWidth": canvas.width,
        "boundsHeight": canvas.height,
        "boundsType": "OBS_BOUNDS_SCALE_INNER",
        "cropLeft": 0,
        "cropRight": 0,
        "cropTop": 0,
        "cropBottom": 0,
        "positionX": 0,
        "positionY": 0,
        "scaleX": 1.0,
        "scaleY": 1.0,
    })
}

/// Build the dice-animation page URL for one roll outcome.
///
/// The `d` parameter is `<count>d<faces>@<values>` with the values joined
/// by spaces and URL-encoded. `noresult` suppresses the page's own result
/// text and `roll` forces the animation to start immediately.
pub fn dice_render_url(colors: &DisplayColors, count: u32, faces: u32, values: &[String]) -> String {
    let encoded_values = urlencoding::encode(&values.join(" ")).into_owned();
    format!(
        "{DICE_RENDER_URL}?dicehex={}&labelhex={}&chromahex={}&d={count}d{faces}@{encoded_values}&transparency=1&noresult&roll",
        colors.dice, colors.label, colors.chroma,
    )
}

/// Parse a hex color string into the integer form the chroma filter takes.
fn chroma_color_int(hex: &str) -> Result<u32, ObsError> {
    let trimmed = hex.trim_start_matches('#');
    u32::from_str_radix(trimmed, 16).map_err(|_| ObsError::InvalidColor(hex.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SceneItem;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// In-memory OBS fake tracking sources, scene items, and filters.
    struct MockObs {
        canvas: StdMutex<CanvasSize>,
        inputs: StdMutex<Vec<String>>,
        items: StdMutex<Vec<SceneItemState>>,
        filters: StdMutex<HashMap<String, Vec<String>>>,
        next_item_id: StdMutex<u64>,
        settings_log: StdMutex<Vec<(String, Value)>>,
    }

    #[derive(Clone)]
    struct SceneItemState {
        id: u64,
        source_name: String,
        locked: bool,
        enabled: bool,
        transform: Option<Value>,
    }

    impl MockObs {
        fn new() -> Self {
            Self {
                canvas: StdMutex::new(CanvasSize {
                    width: 1920,
                    height: 1080,
                }),
                inputs: StdMutex::new(Vec::new()),
                items: StdMutex::new(Vec::new()),
                filters: StdMutex::new(HashMap::new()),
                next_item_id: StdMutex::new(1),
                settings_log: StdMutex::new(Vec::new()),
            }
        }

        fn add_item(&self, source: &str) -> u64 {
            let mut next = self.next_item_id.lock().unwrap();
            let id = *next;
            *next += 1;
            self.items.lock().unwrap().push(SceneItemState {
                id,
                source_name: source.to_string(),
                locked: false,
                enabled: false,
                transform: None,
            });
            id
        }
    }

    #[async_trait]
    impl ObsApi for MockObs {
        async fn get_video_settings(&self) -> Result<CanvasSize, ObsError> {
            Ok(*self.canvas.lock().unwrap())
        }

        async fn list_inputs(&self) -> Result<Vec<String>, ObsError> {
            Ok(self.inputs.lock().unwrap().clone())
        }

        async fn create_input(
            &self,
            _scene: &str,
            name: &str,
            kind: &str,
            _settings: Value,
            _enabled: bool,
        ) -> Result<u64, ObsError> {
            assert_eq!(kind, BROWSER_SOURCE_KIND);
            self.inputs.lock().unwrap().push(name.to_string());
            Ok(self.add_item(name))
        }

        async fn set_input_settings(&self, name: &str, settings: Value) -> Result<(), ObsError> {
            self.settings_log
                .lock()
                .unwrap()
                .push((name.to_string(), settings));
            Ok(())
        }

        async fn list_scene_items(&self, _scene: &str) -> Result<Vec<SceneItem>, ObsError> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .map(|i| SceneItem {
                    id: i.id,
                    source_name: i.source_name.clone(),
                })
                .collect())
        }

        async fn create_scene_item(
            &self,
            _scene: &str,
            source: &str,
            _enabled: bool,
        ) -> Result<u64, ObsError> {
            Ok(self.add_item(source))
        }

        async fn set_scene_item_transform(
            &self,
            _scene: &str,
            item_id: u64,
            transform: Value,
        ) -> Result<(), ObsError> {
            let mut items = self.items.lock().unwrap();
            let item = items.iter_mut().find(|i| i.id == item_id).unwrap();
            item.transform = Some(transform);
            Ok(())
        }

        async fn set_scene_item_locked(
            &self,
            _scene: &str,
            item_id: u64,
            locked: bool,
        ) -> Result<(), ObsError> {
            let mut items = self.items.lock().unwrap();
            items.iter_mut().find(|i| i.id == item_id).unwrap().locked = locked;
            Ok(())
        }

        async fn set_scene_item_enabled(
            &self,
            _scene: &str,
            item_id: u64,
            enabled: bool,
        ) -> Result<(), ObsError> {
            let mut items = self.items.lock().unwrap();
            items.iter_mut().find(|i| i.id == item_id).unwrap().enabled = enabled;
            Ok(())
        }

        async fn list_filters(&self, source: &str) -> Result<Vec<String>, ObsError> {
            Ok(self
                .filters
                .lock()
                .unwrap()
                .get(source)
                .cloned()
                .unwrap_or_default())
        }

        async fn remove_filter(&self, source: &str, filter: &str) -> Result<(), ObsError> {
            if let Some(filters) = self.filters.lock().unwrap().get_mut(source) {
                filters.retain(|f| f != filter);
            }
            Ok(())
        }

        async fn create_filter(
            &self,
            source: &str,
            filter: &str,
            _kind: &str,
            _settings: Value,
        ) -> Result<(), ObsError> {
            self.filters
                .lock()
                .unwrap()
                .entry(source.to_string())
                .or_default()
                .push(filter.to_string());
            Ok(())
        }

        async fn call(&self, _request_type: &str, _data: Value) -> Result<Value, ObsError> {
            Ok(Value::Null)
        }
    }

    fn colors() -> DisplayColors {
        DisplayColors {
            dice: "FF0000".into(),
            label: "FFFFFF".into(),
            chroma: "00FF00".into(),
        }
    }

    fn manager(api: Arc<MockObs>) -> OverlayManager {
        OverlayManager::new(api, "Stream", colors())
    }

    #[test]
    fn test_source_name() {
        assert_eq!(OverlayManager::source_name("roll"), "Dice_!roll");
    }

    #[tokio::test]
    async fn test_ensure_source_creates_everything() {
        let api = Arc::new(MockObs::new());
        let mgr = manager(api.clone());

        let item_id = mgr.ensure_source("Dice_!roll").await.unwrap();

        assert_eq!(api.inputs.lock().unwrap().len(), 1);
        let items = api.items.lock().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, item_id);
        assert!(items[0].locked);
        assert!(items[0].transform.is_some());
        assert_eq!(api.filters.lock().unwrap()["Dice_!roll"].len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_source_is_idempotent() {
        let api = Arc::new(MockObs::new());
        let mgr = manager(api.clone());

        let first = mgr.ensure_source("Dice_!roll").await.unwrap();
        let second = mgr.ensure_source("Dice_!roll").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(api.inputs.lock().unwrap().len(), 1, "exactly one source");
        assert_eq!(api.items.lock().unwrap().len(), 1, "exactly one scene item");
        assert_eq!(
            api.filters.lock().unwrap()["Dice_!roll"].len(),
            1,
            "exactly one filter"
        );
    }

    #[tokio::test]
    async fn test_ensure_source_strips_foreign_filters() {
        let api = Arc::new(MockObs::new());
        api.filters.lock().unwrap().insert(
            "Dice_!roll".to_string(),
            vec!["Color Correction".to_string(), "Old Chroma".to_string()],
        );
        let mgr = manager(api.clone());

        mgr.ensure_source("Dice_!roll").await.unwrap();

        let filters = &api.filters.lock().unwrap()["Dice_!roll"];
        assert_eq!(filters.as_slice(), [CHROMA_FILTER_NAME.to_string()]);
    }

    #[tokio::test]
    async fn test_ensure_source_tracks_canvas_changes() {
        let api = Arc::new(MockObs::new());
        let mgr = manager(api.clone());

        mgr.ensure_source("Dice_!roll").await.unwrap();
        *api.canvas.lock().unwrap() = CanvasSize {
            width: 1280,
            height: 720,
        };
        mgr.ensure_source("Dice_!roll").await.unwrap();

        let items = api.items.lock().unwrap();
        let transform = items[0].transform.as_ref().unwrap();
        assert_eq!(transform["boundsWidth"], 1280);
        assert_eq!(transform["boundsHeight"], 720);
    }

    #[tokio::test]
    async fn test_set_dice_display_writes_render_url() {
        let api = Arc::new(MockObs::new());
        let mgr = manager(api.clone());

        let values = vec!["3".to_string(), "5".to_string()];
        mgr.set_dice_display("Dice_!roll", 6, &values).await.unwrap();

        let log = api.settings_log.lock().unwrap();
        let (_, last) = log.last().unwrap();
        let url = last["url"].as_str().unwrap();
        assert!(url.starts_with(DICE_RENDER_URL));
        assert!(url.contains("d=2d6@3%205"));
        assert!(url.contains("dicehex=FF0000"));
        assert!(url.contains("transparency=1"));
        assert!(url.contains("noresult"));
        assert!(url.ends_with("roll"));
        assert_eq!(last["width"], 1920);
        assert_eq!(last["height"], 1080);
    }

    #[tokio::test]
    async fn test_show_hide_toggle_enabled() {
        let api = Arc::new(MockObs::new());
        let mgr = manager(api.clone());

        let item_id = mgr.ensure_source("Dice_!roll").await.unwrap();
        mgr.show(item_id).await.unwrap();
        assert!(api.items.lock().unwrap()[0].enabled);
        mgr.hide(item_id).await.unwrap();
        assert!(!api.items.lock().unwrap()[0].enabled);
    }

    #[tokio::test]
    async fn test_hide_all() {
        let api = Arc::new(MockObs::new());
        let mgr = manager(api.clone());

        let a = mgr.ensure_source("Dice_!a").await.unwrap();
        let b = mgr.ensure_source("Dice_!b").await.unwrap();
        mgr.show(a).await.unwrap();
        mgr.show(b).await.unwrap();

        mgr.hide_all().await;
        assert!(api.items.lock().unwrap().iter().all(|i| !i.enabled));
    }

    #[test]
    fn test_full_canvas_transform() {
        let t = full_canvas_transform(CanvasSize {
            width: 1920,
            height: 1080,
        });
        assert_eq!(t["boundsType"], "OBS_BOUNDS_SCALE_INNER");
        assert_eq!(t["boundsAlignment"], 0);
        assert_eq!(t["cropLeft"], 0);
        assert_eq!(t["cropRight"], 0);
        assert_eq!(t["cropTop"], 0);
        assert_eq!(t["cropBottom"], 0);
        assert_eq!(t["positionX"], 0);
        assert_eq!(t["positionY"], 0);
        assert_eq!(t["scaleX"], 1.0);
        assert_eq!(t["scaleY"], 1.0);
    }

    #[test]
    fn test_dice_render_url_encoding() {
        let values: Vec<String> = vec!["12".into(), "1".into(), "20".into()];
        let url = dice_render_url(&colors(), 3, 20, &values);
        assert!(url.contains("d=3d20@12%201%2020"));
        assert!(url.contains("labelhex=FFFFFF"));
        assert!(url.contains("chromahex=00FF00"));
    }

    #[test]
    fn test_chroma_color_int() {
        assert_eq!(chroma_color_int("00FF00").unwrap(), 0x00FF00);
        assert_eq!(chroma_color_int("#00FF00").unwrap(), 0x00FF00);
        assert!(chroma_color_int("nope").is_err());
    }
}
