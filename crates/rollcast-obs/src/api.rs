//! Typed surface over the obs-websocket requests the engine consumes.
//!
//! `OverlayManager` talks to OBS exclusively through this trait so tests
//! can substitute an in-memory fake for the protocol client.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::ObsClient;
use crate::error::ObsError;

/// Current canvas output dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

/// A scene item as listed by OBS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneItem {
    pub id: u64,
    pub source_name: String,
}

/// The obs-websocket operations the overlay manager needs.
#[async_trait]
pub trait ObsApi: Send + Sync {
    async fn get_video_settings(&self) -> Result<CanvasSize, ObsError>;
    async fn list_inputs(&self) -> Result<Vec<String>, ObsError>;
    async fn create_input(
        &self,
        scene: &str,
        name: &str,
        kind: &str,
        settings: Value,
        enabled: bool,
    ) -> Result<u64, ObsError>;
    async fn set_input_settings(&self, name: &str, settings: Value) -> Result<(), ObsError>;
    async fn list_scene_items(&self, scene: &str) -> Result<Vec<SceneItem>, ObsError>;
    async fn create_scene_item(
        &self,
        scene: &str,
        source: &str,
        enabled: bool,
    ) -> Result<u64, ObsError>;
    async fn set_scene_item_transform(
        &self,
        scene: &str,
        item_id: u64,
        transform: Value,
    ) -> Result<(), ObsError>;
    async fn set_scene_item_locked(
        &self,
        scene: &str,
        item_id: u64,
        locked: bool,
    ) -> Result<(), ObsError>;
    async fn set_scene_item_enabled(
        &self,
        scene: &str,
        item_id: u64,
        enabled: bool,
    ) -> Result<(), ObsError>;
    async fn list_filters(&self, source: &str) -> Result<Vec<String>, ObsError>;
    async fn remove_filter(&self, source: &str, filter: &str) -> Result<(), ObsError>;
    async fn create_filter(
        &self,
        source: &str,
        filter: &str,
        kind: &str,
        settings: Value,
    ) -> Result<(), ObsError>;

    /// Raw passthrough for extension scripts holding the overlay handle.
    async fn call(&self, request_type: &str, data: Value) -> Result<Value, ObsError>;
}

#[async_trait]
impl ObsApi for ObsClient {
    async fn get_video_settings(&self) -> Result<CanvasSize, ObsError> {
        let data = self.request("GetVideoSettings", json!({})).await?;
        let width = data
            .get("outputWidth")
            .and_then(Value::as_u64)
            .ok_or_else(|| ObsError::Protocol("GetVideoSettings missing outputWidth".into()))?;
        let height = data
            .get("outputHeight")
            .and_then(Value::as_u64)
            .ok_or_else(|| ObsError::Protocol("GetVideoSettings missing outputHeight".into()))?;
        Ok(CanvasSize {
            width: width as u32,
            height: height as u32,
        })
    }

    async fn list_inputs(&self) -> Result<Vec<String>, ObsError> {
        let data = self.request("GetInputList", json!({})).await?;
        let inputs = data
            .get("inputs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(inputs
            .iter()
            .filter_map(|i| i.get("inputName").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn create_input(
        &self,
        scene: &str,
        name: &str,
        kind: &str,
        settings: Value,
        enabled: bool,
    ) -> Result<u64, ObsError> {
        let data = self
            .request(
                "CreateInput",
                json!({
                    "sceneName": scene,
                    "inputName": name,
                    "inputKind": kind,
                    "inputSettings": settings,
                    "sceneItemEnabled": enabled,
                }),
            )
            .await?;
        data.get("sceneItemId")
            .and_then(Value::as_u64)
            .ok_or_else(|| ObsError::Protocol("CreateInput missing sceneItemId".into()))
    }

    async fn set_input_settings(&self, name: &str, settings: Value) -> Result<(), ObsError> {
        self.request(
            "SetInputSettings",
            json!({
                "inputName": name,
                "inputSettings": settings,
                "overlay": true,
            }),
        )
        .await?;
        Ok(())
    }

    async fn list_scene_items(&self, scene: &str) -> Result<Vec<SceneItem>, ObsError> {
        let data = self
            .request("GetSceneItemList", json!({ "sceneName": scene }))
            .await?;
        let items = data
            .get("sceneItems")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(items
            .iter()
            .filter_map(|i| {
                let id = i.get("sceneItemId").and_then(Value::as_u64)?;
                let source_name = i.get("sourceName").and_then(Value::as_str)?.to_string();
                Some(SceneItem { id, source_name })
            })
            .collect())
    }

    async fn create_scene_item(
        &self,
        scene: &str,
        source: &str,
        enabled: bool,
    ) -> Result<u64, ObsError> {
        let data = self
            .request(
                "CreateSceneItem",
                json!({
                    "sceneName": scene,
                    "sourceName": source,
                    "sceneItemEnabled": enabled,
                }),
            )
            .await?;
        data.get("sceneItemId")
            .and_then(Value::as_u64)
            .ok_or_else(|| ObsError::Protocol("CreateSceneItem missing sceneItemId".into()))
    }

    async fn set_scene_item_transform(
        &self,
        scene: &str,
        item_id: u64,
        transform: Value,
    ) -> Result<(), ObsError> {
        self.request(
            "SetSceneItemTransform",
            json!({
                "sceneName": scene,
                "sceneItemId": item_id,
                "sceneItemTransform": transform,
            }),
        )
        .await?;
        Ok(())
    }

    async fn set_scene_item_locked(
        &self,
        scene: &str,
        item_id: u64,
        locked: bool,
    ) -> Result<(), ObsError> {
        self.request(
            "SetSceneItemLocked",
            json!({
                "sceneName": scene,
                "sceneItemId": item_id,
                "sceneItemLocked": locked,
            }),
        )
        .await?;
        Ok(())
    }

    async fn set_scene_item_enabled(
        &self,
        scene: &str,
        item_id: u64,
        enabled: bool,
    ) -> Result<(), ObsError> {
        self.request(
            "SetSceneItemEnabled",
            json!({
                "sceneName": scene,
                "sceneItemId": item_id,
                "sceneItemEnabled": enabled,
            }),
        )
        .await?;
        Ok(())
    }

    async fn list_filters(&self, source: &str) -> Result<Vec<String>, ObsError> {
        let data = self
            .request("GetSourceFilterList", json!({ "sourceName": source }))
            .await?;
        let filters = data
            .get("filters")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(filters
            .iter()
            .filter_map(|f| f.get("filterName").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn remove_filter(&self, source: &str, filter: &str) -> Result<(), ObsError> {
        self.request(
            "RemoveSourceFilter",
            json!({ "sourceName": source, "filterName": filter }),
        )
        .await?;
        Ok(())
    }

    async fn create_filter(
        &self,
        source: &str,
        filter: &str,
        kind: &str,
        settings: Value,
    ) -> Result<(), ObsError> {
        self.request(
            "CreateSourceFilter",
            json!({
                "sourceName": source,
                "filterName": filter,
                "filterKind": kind,
                "filterSettings": settings,
            }),
        )
        .await?;
        Ok(())
    }

    async fn call(&self, request_type: &str, data: Value) -> Result<Value, ObsError> {
        self.request(request_type, data).await
    }
}
