//! Controller-side node orchestration.
//!
//! A [`Node`] is the controller's representation of one emulated device.
//! The device itself runs on a remote compute; the node keeps a shadow
//! copy of the compute-owned facts (console, command line, node
//! directory, echoed properties) and refreshes it only from confirmed
//! compute responses. A failed call leaves the node's visible state
//! untouched.
//!
//! Lifecycle operations take `&mut self`: a node has a single writer and
//! callers sharing one must serialize access themselves. There is no
//! internal lock and no cancellation; abandoning an operation means
//! letting the underlying request fail or time out.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use netlab_compute::{ComputeClient, ComputeError, ComputeResponse, ImageProvisioner, RequestTimeout};
use netlab_core::NodeId;

use crate::error::{ControllerError, Result};
use crate::notification::{NotificationSink, NODE_UPDATED};
use crate::project::Project;
use crate::reconcile::{self, LocalChanges, NodePatch, NodeSnapshot, Reconciliation, RemoteChanges};
use crate::schema::NodeType;
use crate::types::{Label, NodeStatus, PropertyMap};

/// idlepc computation is CPU-bound on the compute and routinely takes
/// minutes; the default transport timeout would kill it.
const IDLEPC_TIMEOUT: Duration = Duration::from_secs(240);

const DEFAULT_SYMBOL: &str = ":/symbols/computer.svg";

/// Construction-time settings for a node.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Emulator type backing the node.
    pub node_type: NodeType,
    /// Identifier; generated when absent (fresh node) and supplied when a
    /// saved topology is loaded.
    pub node_id: Option<NodeId>,
    /// Console port, when already known.
    pub console: Option<u16>,
    /// Console type (telnet, vnc, ...).
    pub console_type: Option<String>,
    /// Initial emulator-specific properties.
    pub properties: PropertyMap,
    /// Canvas coordinates.
    pub x: i32,
    /// See `x`.
    pub y: i32,
    /// See `x`.
    pub z: i32,
    /// Rendered width.
    pub width: u32,
    /// Rendered height.
    pub height: u32,
    /// Symbol path; defaults to the generic computer symbol.
    pub symbol: Option<String>,
}

impl NodeOptions {
    /// Defaults for the given emulator type.
    #[must_use]
    pub fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            node_id: None,
            console: None,
            console_type: None,
            properties: PropertyMap::new(),
            x: 0,
            y: 0,
            z: 1,
            width: 0,
            height: 0,
            symbol: None,
        }
    }
}

/// One emulated device, as seen by the controller.
pub struct Node {
    project: Arc<dyn Project>,
    compute: Arc<dyn ComputeClient>,
    notifier: Arc<dyn NotificationSink>,
    provisioner: ImageProvisioner,

    node_id: NodeId,
    node_type: NodeType,
    name: String,
    status: NodeStatus,

    // Shadow copies of compute-owned truth.
    console: Option<u16>,
    console_type: Option<String>,
    command_line: Option<String>,
    node_directory: Option<String>,

    properties: PropertyMap,

    x: i32,
    y: i32,
    z: i32,
    width: u32,
    height: u32,
    symbol: String,
    label: Label,
}

impl Node {
    /// Build a node in memory. The remote instance does not exist until
    /// [`Node::create`] succeeds.
    #[must_use]
    pub fn new(
        project: Arc<dyn Project>,
        compute: Arc<dyn ComputeClient>,
        notifier: Arc<dyn NotificationSink>,
        provisioner: ImageProvisioner,
        name: impl Into<String>,
        options: NodeOptions,
    ) -> Self {
        let name = name.into();
        let label = Label::for_name(&name);
        Self {
            project,
            compute,
            notifier,
            provisioner,
            node_id: options.node_id.unwrap_or_else(NodeId::generate),
            node_type: options.node_type,
            name,
            status: NodeStatus::Stopped,
            console: options.console,
            console_type: options.console_type,
            command_line: None,
            node_directory: None,
            properties: options.properties,
            x: options.x,
            y: options.y,
            z: options.z,
            width: options.width,
            height: options.height,
            symbol: options
                .symbol
                .unwrap_or_else(|| DEFAULT_SYMBOL.to_string()),
            label,
        }
    }

    /// The node's identifier.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.node_id
    }

    /// The emulator type backing the node.
    #[must_use]
    pub const fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// The node's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last reported run state.
    #[must_use]
    pub const fn status(&self) -> NodeStatus {
        self.status
    }

    /// Console port, as last confirmed by the compute.
    #[must_use]
    pub const fn console(&self) -> Option<u16> {
        self.console
    }

    /// Console type.
    #[must_use]
    pub fn console_type(&self) -> Option<&str> {
        self.console_type.as_deref()
    }

    /// Command line reported by the compute, if the node has started.
    #[must_use]
    pub fn command_line(&self) -> Option<&str> {
        self.command_line.as_deref()
    }

    /// Working directory reported by the compute.
    #[must_use]
    pub fn node_directory(&self) -> Option<&str> {
        self.node_directory.as_deref()
    }

    /// The emulator-specific property bag.
    #[must_use]
    pub const fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    /// Canvas x coordinate.
    #[must_use]
    pub const fn x(&self) -> i32 {
        self.x
    }

    /// Canvas y coordinate.
    #[must_use]
    pub const fn y(&self) -> i32 {
        self.y
    }

    /// The node's label.
    #[must_use]
    pub const fn label(&self) -> &Label {
        &self.label
    }

    fn nodes_path(&self) -> String {
        format!(
            "/projects/{}/{}/nodes",
            self.project.id(),
            self.node_type.path_segment()
        )
    }

    fn node_path(&self) -> String {
        format!("{}/{}", self.nodes_path(), self.node_id)
    }

    fn subresource(&self, subpath: &str) -> String {
        format!("{}{subpath}", self.node_path())
    }

    /// Create the remote instance on the compute.
    ///
    /// If the compute rejects the creation because a required image is
    /// missing, the image is provisioned from the local store and the
    /// creation retried exactly once; a second failure propagates. Any
    /// other failure propagates untouched and leaves local state as it
    /// was.
    ///
    /// # Errors
    ///
    /// Returns a `ControllerError` if the compute call (or the one-shot
    /// recovery) fails.
    pub async fn create(&mut self) -> Result<()> {
        let payload = Value::Object(self.creation_payload());
        tracing::debug!(node_id = %self.node_id, node_type = %self.node_type, "creating node on compute");

        let response = match self
            .compute
            .post(&self.nodes_path(), Some(payload.clone()), RequestTimeout::Default)
            .await
        {
            Ok(response) => response,
            Err(ComputeError::ImageMissing { image }) => {
                tracing::warn!(
                    node_id = %self.node_id,
                    image,
                    "compute is missing an image, provisioning and retrying"
                );
                self.upload_missing_image(self.node_type, &image).await?;
                // One retry only; any further failure propagates.
                self.compute
                    .post(&self.nodes_path(), Some(payload), RequestTimeout::Default)
                    .await?
            }
            Err(error) => return Err(error.into()),
        };

        self.apply_echo(&response.body);
        Ok(())
    }

    /// Apply a requested change set.
    ///
    /// Controller-only changes are applied locally without touching the
    /// network. If any compute-dispatched field changed, the diff is sent
    /// to the compute; the response echo is then merged (the compute is
    /// authoritative solely for the keys it echoes) and the topology dump
    /// is scheduled. A `"node.updated"` event is emitted iff at least one
    /// observable field actually changed; a no-op emits nothing.
    ///
    /// # Errors
    ///
    /// Returns a `ControllerError` if the compute dispatch fails; local
    /// state is left unchanged in that case.
    pub async fn update(&mut self, patch: NodePatch) -> Result<()> {
        let Reconciliation {
            local,
            accepted,
            payload,
            compute_dirty,
        } = reconcile::reconcile(self.node_type.schema(), &self.snapshot(), &patch);

        if !compute_dirty && local.is_empty() {
            return Ok(());
        }

        let before = self.as_json();

        if compute_dirty {
            tracing::debug!(node_id = %self.node_id, "dispatching node update to compute");
            let response = self
                .compute
                .put(&self.node_path(), Value::Object(payload), RequestTimeout::Default)
                .await?;
            self.apply_accepted(accepted);
            self.apply_echo(&response.body);
            self.apply_local(local);
            self.project.schedule_dump();
        } else {
            self.apply_local(local);
        }

        let after = self.as_json();
        if after != before {
            self.notifier.emit(NODE_UPDATED, after);
        }
        Ok(())
    }

    /// Start the remote instance.
    ///
    /// # Errors
    ///
    /// Returns a `ControllerError` if the compute call fails. Never
    /// retried.
    pub async fn start(&mut self) -> Result<()> {
        self.lifecycle_action("start").await
    }

    /// Stop the remote instance.
    ///
    /// # Errors
    ///
    /// Returns a `ControllerError` if the compute call fails.
    pub async fn stop(&mut self) -> Result<()> {
        self.lifecycle_action("stop").await
    }

    /// Suspend the remote instance.
    ///
    /// # Errors
    ///
    /// Returns a `ControllerError` if the compute call fails.
    pub async fn suspend(&mut self) -> Result<()> {
        self.lifecycle_action("suspend").await
    }

    /// Reload the remote instance.
    ///
    /// # Errors
    ///
    /// Returns a `ControllerError` if the compute call fails.
    pub async fn reload(&mut self) -> Result<()> {
        self.lifecycle_action("reload").await
    }

    async fn lifecycle_action(&mut self, action: &str) -> Result<()> {
        tracing::debug!(node_id = %self.node_id, action, "node lifecycle action");
        self.compute
            .post(
                &format!("{}/{action}", self.node_path()),
                None,
                RequestTimeout::Default,
            )
            .await?;
        Ok(())
    }

    /// Tear down the remote instance. The local object should be dropped
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns a `ControllerError` if the compute call fails.
    pub async fn destroy(&mut self) -> Result<()> {
        tracing::debug!(node_id = %self.node_id, "destroying node on compute");
        self.compute.delete(&self.node_path()).await?;
        Ok(())
    }

    /// Generic POST against a node-scoped sub-resource (packet captures
    /// and the like).
    ///
    /// # Errors
    ///
    /// Returns a `ControllerError` if the compute call fails.
    pub async fn post(
        &self,
        subpath: &str,
        data: Option<Value>,
        timeout: RequestTimeout,
    ) -> Result<ComputeResponse> {
        Ok(self
            .compute
            .post(&self.subresource(subpath), data, timeout)
            .await?)
    }

    /// Generic GET against a node-scoped sub-resource.
    ///
    /// # Errors
    ///
    /// Returns a `ControllerError` if the compute call fails.
    pub async fn get(&self, subpath: &str, timeout: RequestTimeout) -> Result<ComputeResponse> {
        Ok(self.compute.get(&self.subresource(subpath), timeout).await?)
    }

    /// Generic DELETE against a node-scoped sub-resource.
    ///
    /// # Errors
    ///
    /// Returns a `ControllerError` if the compute call fails.
    pub async fn delete(&self, subpath: &str) -> Result<ComputeResponse> {
        Ok(self.compute.delete(&self.subresource(subpath)).await?)
    }

    /// Ask the compute to compute the best idlepc value for a Dynamips
    /// router.
    ///
    /// # Errors
    ///
    /// Fails when the node is not a Dynamips node, on compute failure, or
    /// when the response lacks the candidate.
    pub async fn dynamips_auto_idlepc(&self) -> Result<String> {
        self.require_dynamips("auto_idlepc")?;
        let response = self
            .compute
            .get(
                &self.subresource("/auto_idlepc"),
                RequestTimeout::Fixed(IDLEPC_TIMEOUT),
            )
            .await?;
        response
            .body
            .get("idlepc")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| {
                ControllerError::MalformedResponse("missing idlepc candidate".to_string())
            })
    }

    /// Ask the compute for an ordered list of idlepc candidates.
    ///
    /// # Errors
    ///
    /// Fails when the node is not a Dynamips node, on compute failure, or
    /// when the response is not a list.
    pub async fn dynamips_idlepc_proposals(&self) -> Result<Vec<String>> {
        self.require_dynamips("idlepc_proposals")?;
        let response = self
            .compute
            .get(
                &self.subresource("/idlepc_proposals"),
                RequestTimeout::Fixed(IDLEPC_TIMEOUT),
            )
            .await?;
        response
            .body
            .as_array()
            .map(|candidates| {
                candidates
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .ok_or_else(|| {
                ControllerError::MalformedResponse("expected a list of idlepc candidates".to_string())
            })
    }

    fn require_dynamips(&self, operation: &'static str) -> Result<()> {
        if self.node_type == NodeType::Dynamips {
            Ok(())
        } else {
            Err(ControllerError::UnsupportedOperation {
                node_type: self.node_type,
                operation,
            })
        }
    }

    /// Resolve `filename` in the local image store and upload it to the
    /// compute. Does not retry; the caller decides what a failure means.
    ///
    /// # Errors
    ///
    /// Fails when the image is not in the store or the transfer fails.
    pub async fn upload_missing_image(&self, node_type: NodeType, filename: &str) -> Result<()> {
        self.provisioner
            .provision(self.compute.as_ref(), node_type.path_segment(), filename)
            .await?;
        Ok(())
    }

    /// Full serialized form, as emitted in notifications and API replies.
    #[must_use]
    pub fn as_json(&self) -> Value {
        json!({
            "compute_id": self.compute.id(),
            "project_id": self.project.id(),
            "node_id": self.node_id,
            "node_type": self.node_type,
            "name": self.name,
            "console": self.console,
            "console_type": self.console_type,
            "console_host": self.compute.host(),
            "command_line": self.command_line,
            "node_directory": self.node_directory,
            "properties": self.properties,
            "status": self.status,
            "x": self.x,
            "y": self.y,
            "z": self.z,
            "width": self.width,
            "height": self.height,
            "symbol": self.symbol,
            "label": self.label,
        })
    }

    /// Persisted-to-disk form: topology facts only, no runtime facts.
    #[must_use]
    pub fn topology_json(&self) -> Value {
        json!({
            "node_id": self.node_id,
            "node_type": self.node_type,
            "name": self.name,
            "console": self.console,
            "console_type": self.console_type,
            "properties": self.properties,
            "x": self.x,
            "y": self.y,
            "z": self.z,
            "width": self.width,
            "height": self.height,
            "symbol": self.symbol,
            "label": self.label,
        })
    }

    fn snapshot(&self) -> NodeSnapshot<'_> {
        NodeSnapshot {
            name: &self.name,
            console: self.console,
            console_type: self.console_type.as_deref(),
            x: self.x,
            y: self.y,
            z: self.z,
            width: self.width,
            height: self.height,
            symbol: &self.symbol,
            label: &self.label,
            properties: &self.properties,
        }
    }

    fn creation_payload(&self) -> PropertyMap {
        let mut payload = PropertyMap::new();
        payload.insert("node_id".to_string(), json!(self.node_id));
        payload.insert("name".to_string(), json!(self.name));
        if let Some(console) = self.console {
            payload.insert("console".to_string(), json!(console));
        }
        if let Some(console_type) = &self.console_type {
            payload.insert("console_type".to_string(), json!(console_type));
        }

        let schema = self.node_type.schema();
        for (key, value) in &self.properties {
            if value.is_null() {
                // Null means "not specified": the emulator default applies.
                continue;
            }
            if schema.compute_properties.contains(&key.as_str()) {
                payload.insert(key.clone(), value.clone());
            }
        }
        payload
    }

    /// Merge a confirmed compute response into shadow state. Only keys
    /// present in the echo overwrite anything.
    fn apply_echo(&mut self, body: &Value) {
        let Some(object) = body.as_object() else {
            return;
        };
        for (key, value) in object {
            match key.as_str() {
                "console" => {
                    self.console = value.as_u64().and_then(|port| u16::try_from(port).ok());
                }
                "console_type" => {
                    if let Some(console_type) = value.as_str() {
                        self.console_type = Some(console_type.to_string());
                    }
                }
                "command_line" => {
                    self.command_line = value.as_str().map(ToString::to_string);
                }
                "node_directory" => {
                    self.node_directory = value.as_str().map(ToString::to_string);
                }
                "node_id" | "name" | "project_id" | "node_type" | "status" => {}
                _ => {
                    if !value.is_null() {
                        self.properties.insert(key.clone(), value.clone());
                    }
                }
            }
        }
    }

    /// Apply requested compute-side values after a confirmed dispatch.
    /// Runs before the echo merge, so echoed values win.
    fn apply_accepted(&mut self, accepted: RemoteChanges) {
        if let Some(name) = accepted.name {
            self.name = name;
            self.label.text.clone_from(&self.name);
        }
        if let Some(console) = accepted.console {
            self.console = Some(console);
        }
        if let Some(console_type) = accepted.console_type {
            self.console_type = Some(console_type);
        }
    }

    fn apply_local(&mut self, local: LocalChanges) {
        if let Some(x) = local.x {
            self.x = x;
        }
        if let Some(y) = local.y {
            self.y = y;
        }
        if let Some(z) = local.z {
            self.z = z;
        }
        if let Some(width) = local.width {
            self.width = width;
        }
        if let Some(height) = local.height {
            self.height = height;
        }
        if let Some(symbol) = local.symbol {
            self.symbol = symbol;
        }
        if let Some(label_patch) = local.label {
            self.label.merge(&label_patch);
            // Label text always mirrors the node name.
            self.label.text.clone_from(&self.name);
        }
        self.properties.extend(local.properties);
    }
}

impl PartialEq for Node {
    /// Node identity is `(project, node_id)`; type and name never
    /// participate.
    fn eq(&self, other: &Self) -> bool {
        self.project.id() == other.project.id() && self.node_id == other.node_id
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.node_id)
            .field("node_type", &self.node_type)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::PathBuf;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use netlab_compute::DirectoryImageStore;
    use netlab_core::{ComputeId, ProjectId};

    use crate::types::LabelPatch;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Post {
            path: String,
            body: Option<Value>,
            timeout: RequestTimeout,
        },
        Put {
            path: String,
            body: Value,
            timeout: RequestTimeout,
        },
        Get {
            path: String,
            timeout: RequestTimeout,
        },
        Delete {
            path: String,
        },
        Upload {
            path: String,
            source: PathBuf,
        },
    }

    /// A compute that records every call and answers from a scripted
    /// queue (HTTP 200 with an empty body once the queue runs dry).
    struct ScriptedCompute {
        id: ComputeId,
        calls: Mutex<Vec<Call>>,
        responses: Mutex<VecDeque<netlab_compute::Result<ComputeResponse>>>,
    }

    impl ScriptedCompute {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: ComputeId::new("http://test.com:42"),
                calls: Mutex::new(Vec::new()),
                responses: Mutex::new(VecDeque::new()),
            })
        }

        fn respond_with(&self, body: Value) {
            self.responses
                .lock()
                .push_back(Ok(ComputeResponse { status: 200, body }));
        }

        fn fail_with(&self, error: ComputeError) {
            self.responses.lock().push_back(Err(error));
        }

        fn next_response(&self) -> netlab_compute::Result<ComputeResponse> {
            self.responses.lock().pop_front().unwrap_or(Ok(ComputeResponse {
                status: 200,
                body: Value::Null,
            }))
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn upload_count(&self) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|call| matches!(call, Call::Upload { .. }))
                .count()
        }

        fn post_count(&self) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|call| matches!(call, Call::Post { .. }))
                .count()
        }
    }

    #[async_trait]
    impl ComputeClient for ScriptedCompute {
        fn id(&self) -> &ComputeId {
            &self.id
        }

        fn host(&self) -> &str {
            "test.com"
        }

        async fn post(
            &self,
            path: &str,
            body: Option<Value>,
            timeout: RequestTimeout,
        ) -> netlab_compute::Result<ComputeResponse> {
            self.calls.lock().push(Call::Post {
                path: path.to_string(),
                body,
                timeout,
            });
            self.next_response()
        }

        async fn put(
            &self,
            path: &str,
            body: Value,
            timeout: RequestTimeout,
        ) -> netlab_compute::Result<ComputeResponse> {
            self.calls.lock().push(Call::Put {
                path: path.to_string(),
                body,
                timeout,
            });
            self.next_response()
        }

        async fn get(
            &self,
            path: &str,
            timeout: RequestTimeout,
        ) -> netlab_compute::Result<ComputeResponse> {
            self.calls.lock().push(Call::Get {
                path: path.to_string(),
                timeout,
            });
            self.next_response()
        }

        async fn delete(&self, path: &str) -> netlab_compute::Result<ComputeResponse> {
            self.calls.lock().push(Call::Delete {
                path: path.to_string(),
            });
            self.next_response()
        }

        async fn upload(
            &self,
            path: &str,
            source: &std::path::Path,
        ) -> netlab_compute::Result<ComputeResponse> {
            self.calls.lock().push(Call::Upload {
                path: path.to_string(),
                source: source.to_path_buf(),
            });
            self.next_response()
        }
    }

    struct RecordingProject {
        id: ProjectId,
        dumps: Mutex<usize>,
    }

    impl RecordingProject {
        fn new(id: ProjectId) -> Arc<Self> {
            Arc::new(Self {
                id,
                dumps: Mutex::new(0),
            })
        }

        fn dump_count(&self) -> usize {
            *self.dumps.lock()
        }
    }

    impl Project for RecordingProject {
        fn id(&self) -> ProjectId {
            self.id
        }

        fn schedule_dump(&self) {
            *self.dumps.lock() += 1;
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<(String, Value)>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn events(&self) -> Vec<(String, Value)> {
            self.events.lock().clone()
        }
    }

    impl NotificationSink for RecordingSink {
        fn emit(&self, event: &str, payload: Value) {
            self.events.lock().push((event.to_string(), payload));
        }
    }

    struct Fixture {
        compute: Arc<ScriptedCompute>,
        project: Arc<RecordingProject>,
        sink: Arc<RecordingSink>,
        images: tempfile::TempDir,
        node: Node,
    }

    fn fixture_with(options: NodeOptions) -> Fixture {
        let compute = ScriptedCompute::new();
        let project = RecordingProject::new(ProjectId::generate());
        let sink = RecordingSink::new();
        let images = tempfile::tempdir().unwrap();
        let provisioner =
            ImageProvisioner::new(Arc::new(DirectoryImageStore::new(images.path())));
        let node = Node::new(
            project.clone(),
            compute.clone(),
            sink.clone(),
            provisioner,
            "demo",
            options,
        );
        Fixture {
            compute,
            project,
            sink,
            images,
            node,
        }
    }

    fn vpcs_options() -> NodeOptions {
        let mut options = NodeOptions::new(NodeType::Vpcs);
        options.console_type = Some("vnc".to_string());
        options
            .properties
            .insert("startup_script".to_string(), json!("echo test"));
        options
    }

    fn fixture() -> Fixture {
        fixture_with(vpcs_options())
    }

    #[test]
    fn equality_is_identity_only() {
        let f = fixture();
        let mut options = NodeOptions::new(NodeType::Qemu);
        options.node_id = Some(f.node.id());
        let same_identity = Node::new(
            f.project.clone(),
            f.compute.clone(),
            f.sink.clone(),
            ImageProvisioner::new(Arc::new(DirectoryImageStore::new(f.images.path()))),
            "other-name",
            options,
        );
        assert_eq!(f.node, same_identity);

        let other_id = Node::new(
            f.project.clone(),
            f.compute.clone(),
            f.sink.clone(),
            ImageProvisioner::new(Arc::new(DirectoryImageStore::new(f.images.path()))),
            "demo",
            NodeOptions::new(NodeType::Qemu),
        );
        assert_ne!(f.node, other_id);

        let mut options = NodeOptions::new(NodeType::Vpcs);
        options.node_id = Some(f.node.id());
        let other_project = Node::new(
            RecordingProject::new(ProjectId::generate()),
            f.compute.clone(),
            f.sink.clone(),
            ImageProvisioner::new(Arc::new(DirectoryImageStore::new(f.images.path()))),
            "demo",
            options,
        );
        assert_ne!(f.node, other_project);
    }

    #[test]
    fn full_json_form() {
        let f = fixture();
        assert_eq!(
            f.node.as_json(),
            json!({
                "compute_id": "http://test.com:42",
                "project_id": f.project.id(),
                "node_id": f.node.id(),
                "node_type": "vpcs",
                "name": "demo",
                "console": null,
                "console_type": "vnc",
                "console_host": "test.com",
                "command_line": null,
                "node_directory": null,
                "properties": {"startup_script": "echo test"},
                "status": "stopped",
                "x": 0,
                "y": 0,
                "z": 1,
                "width": 0,
                "height": 0,
                "symbol": ":/symbols/computer.svg",
                "label": f.node.label(),
            })
        );
    }

    #[test]
    fn topology_json_omits_runtime_facts() {
        let f = fixture();
        let dump = f.node.topology_json();
        let object = dump.as_object().unwrap();
        for runtime_key in [
            "project_id",
            "compute_id",
            "console_host",
            "command_line",
            "node_directory",
            "status",
        ] {
            assert!(!object.contains_key(runtime_key), "{runtime_key} leaked");
        }
        assert_eq!(object.get("name"), Some(&json!("demo")));
        assert_eq!(object.get("node_type"), Some(&json!("vpcs")));
    }

    #[test]
    fn generates_id_when_absent() {
        let a = fixture();
        let b = fixture();
        assert_ne!(a.node.id(), b.node.id());
    }

    #[tokio::test]
    async fn create_sends_payload_and_applies_echo() {
        let mut options = vpcs_options();
        options.console = Some(2048);
        let mut f = fixture_with(options);
        f.compute.respond_with(json!({"console": 2048}));

        f.node.create().await.unwrap();

        assert_eq!(
            f.compute.calls(),
            vec![Call::Post {
                path: format!("/projects/{}/vpcs/nodes", f.project.id()),
                body: Some(json!({
                    "console": 2048,
                    "console_type": "vnc",
                    "node_id": f.node.id(),
                    "startup_script": "echo test",
                    "name": "demo",
                })),
                timeout: RequestTimeout::Default,
            }]
        );
        assert_eq!(f.node.console(), Some(2048));
        assert_eq!(
            Value::Object(f.node.properties().clone()),
            json!({"startup_script": "echo test"})
        );
    }

    #[tokio::test]
    async fn create_without_console_merges_unknown_echo_keys() {
        let mut f = fixture();
        f.compute
            .respond_with(json!({"console": 2048, "test_value": "success"}));

        f.node.create().await.unwrap();

        let calls = f.compute.calls();
        let Call::Post { body, .. } = &calls[0] else {
            panic!("expected a POST");
        };
        assert_eq!(
            body,
            &Some(json!({
                "console_type": "vnc",
                "node_id": f.node.id(),
                "startup_script": "echo test",
                "name": "demo",
            }))
        );
        assert_eq!(f.node.console(), Some(2048));
        assert_eq!(
            Value::Object(f.node.properties().clone()),
            json!({"startup_script": "echo test", "test_value": "success"})
        );
    }

    #[tokio::test]
    async fn create_drops_null_properties() {
        let mut options = vpcs_options();
        options
            .properties
            .insert("startup_script_path".to_string(), Value::Null);
        let mut f = fixture_with(options);

        f.node.create().await.unwrap();

        let calls = f.compute.calls();
        let Call::Post { body, .. } = &calls[0] else {
            panic!("expected a POST");
        };
        assert!(!body
            .as_ref()
            .unwrap()
            .as_object()
            .unwrap()
            .contains_key("startup_script_path"));
    }

    #[tokio::test]
    async fn create_provisions_missing_image_and_retries_once() {
        let mut options = NodeOptions::new(NodeType::Qemu);
        options
            .properties
            .insert("hda_disk_image".to_string(), json!("linux.img"));
        let mut f = fixture_with(options);
        std::fs::write(f.images.path().join("linux.img"), b"x").unwrap();

        f.compute.fail_with(ComputeError::ImageMissing {
            image: "linux.img".to_string(),
        });
        // upload then retried create both succeed
        f.compute.respond_with(Value::Null);
        f.compute.respond_with(Value::Null);

        f.node.create().await.unwrap();

        let calls = f.compute.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], Call::Post { .. }));
        assert_eq!(
            calls[1],
            Call::Upload {
                path: "/qemu/images/linux.img".to_string(),
                source: f.images.path().join("linux.img"),
            }
        );
        assert!(matches!(calls[2], Call::Post { .. }));
    }

    #[tokio::test]
    async fn create_never_uploads_for_other_failures() {
        let mut f = fixture();
        f.compute.fail_with(ComputeError::Http {
            status: 500,
            detail: "boom".to_string(),
        });

        let error = f.node.create().await.unwrap_err();
        assert_eq!(error.http_status_code(), 500);
        assert_eq!(f.compute.upload_count(), 0);
        assert_eq!(f.compute.post_count(), 1);
    }

    #[tokio::test]
    async fn create_retry_failure_propagates() {
        let mut f = fixture_with(NodeOptions::new(NodeType::Qemu));
        std::fs::write(f.images.path().join("linux.img"), b"x").unwrap();

        f.compute.fail_with(ComputeError::ImageMissing {
            image: "linux.img".to_string(),
        });
        f.compute.respond_with(Value::Null); // upload succeeds
        f.compute.fail_with(ComputeError::ImageMissing {
            image: "linux.img".to_string(),
        });

        let error = f.node.create().await.unwrap_err();
        assert!(matches!(
            error,
            ControllerError::Compute(ComputeError::ImageMissing { .. })
        ));
        // exactly one upload, exactly one retry
        assert_eq!(f.compute.upload_count(), 1);
        assert_eq!(f.compute.post_count(), 2);
    }

    #[tokio::test]
    async fn create_fails_when_image_not_in_store() {
        let mut f = fixture_with(NodeOptions::new(NodeType::Qemu));
        f.compute.fail_with(ComputeError::ImageMissing {
            image: "linux.img".to_string(),
        });

        let error = f.node.create().await.unwrap_err();
        assert!(matches!(
            error,
            ControllerError::Compute(ComputeError::ImageNotFound { .. })
        ));
        assert_eq!(f.compute.upload_count(), 0);
        assert_eq!(f.compute.post_count(), 1);
    }

    #[tokio::test]
    async fn update_dispatches_diff_and_merges_echo() {
        let mut f = fixture();
        f.compute.respond_with(json!({"console": 2048}));

        f.node
            .update(NodePatch {
                x: Some(42),
                console: Some(2048),
                console_type: Some("vnc".to_string()),
                name: Some("demo".to_string()),
                properties: [("startup_script".to_string(), json!("echo test"))]
                    .into_iter()
                    .collect(),
                ..NodePatch::default()
            })
            .await
            .unwrap();

        assert_eq!(
            f.compute.calls(),
            vec![Call::Put {
                path: format!("/projects/{}/vpcs/nodes/{}", f.project.id(), f.node.id()),
                body: json!({
                    "console": 2048,
                    "console_type": "vnc",
                    "name": "demo",
                }),
                timeout: RequestTimeout::Default,
            }]
        );
        assert_eq!(f.node.console(), Some(2048));
        assert_eq!(f.node.x(), 42);
        assert_eq!(f.project.dump_count(), 1);

        let events = f.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, NODE_UPDATED);
        assert_eq!(events[0].1, f.node.as_json());
    }

    #[tokio::test]
    async fn update_merges_only_echoed_property_keys() {
        let mut f = fixture();
        f.compute.respond_with(json!({"console": 2048}));

        f.node
            .update(NodePatch {
                x: Some(42),
                console: Some(2048),
                properties: [("startup_script".to_string(), json!("hello world"))]
                    .into_iter()
                    .collect(),
                ..NodePatch::default()
            })
            .await
            .unwrap();

        let calls = f.compute.calls();
        let Call::Put { body, .. } = &calls[0] else {
            panic!("expected a PUT");
        };
        assert_eq!(body.get("startup_script"), Some(&json!("hello world")));

        // Compute echoed nothing for startup_script: the local value is
        // preserved, not the requested one.
        assert_eq!(
            f.node.properties().get("startup_script"),
            Some(&json!("echo test"))
        );

        let events = f.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].1["properties"]["startup_script"],
            json!("echo test")
        );
    }

    #[tokio::test]
    async fn controller_only_update_skips_the_compute() {
        let mut f = fixture();

        f.node
            .update(NodePatch {
                x: Some(42),
                ..NodePatch::default()
            })
            .await
            .unwrap();

        assert!(f.compute.calls().is_empty());
        assert_eq!(f.node.x(), 42);
        assert_eq!(f.project.dump_count(), 0);
        assert_eq!(f.sink.events().len(), 1);

        // Identical resubmission is a no-op: no call, no notification.
        f.node
            .update(NodePatch {
                x: Some(42),
                ..NodePatch::default()
            })
            .await
            .unwrap();

        assert!(f.compute.calls().is_empty());
        assert_eq!(f.sink.events().len(), 1);
    }

    #[tokio::test]
    async fn unchanged_compute_fields_do_not_redispatch() {
        let mut f = fixture();
        f.compute.respond_with(json!({"console": 2048}));

        f.node
            .update(NodePatch {
                console: Some(2048),
                x: Some(42),
                ..NodePatch::default()
            })
            .await
            .unwrap();
        assert_eq!(f.compute.calls().len(), 1);

        f.node
            .update(NodePatch {
                console: Some(2048),
                x: Some(43),
                ..NodePatch::default()
            })
            .await
            .unwrap();

        // console already matches the shadow state: controller-only path
        assert_eq!(f.compute.calls().len(), 1);
        assert_eq!(f.node.x(), 43);
    }

    #[tokio::test]
    async fn rename_pins_label_text() {
        let mut f = fixture();

        f.node
            .update(NodePatch {
                name: Some("Test".to_string()),
                ..NodePatch::default()
            })
            .await
            .unwrap();
        assert_eq!(f.node.name(), "Test");
        assert_eq!(f.node.label().text, "Test");

        f.node
            .update(NodePatch {
                label: Some(LabelPatch {
                    text: Some("Wrong".to_string()),
                    x: Some(12),
                    ..LabelPatch::default()
                }),
                ..NodePatch::default()
            })
            .await
            .unwrap();
        assert_eq!(f.node.label().text, "Test");
        assert_eq!(f.node.label().x, Some(12));
    }

    #[tokio::test]
    async fn update_failure_leaves_state_untouched() {
        let mut f = fixture();
        f.compute.fail_with(ComputeError::Transport("down".to_string()));

        let before = f.node.as_json();
        let result = f
            .node
            .update(NodePatch {
                console: Some(2048),
                x: Some(42),
                ..NodePatch::default()
            })
            .await;

        assert!(result.is_err());
        assert_eq!(f.node.as_json(), before);
        assert!(f.sink.events().is_empty());
        assert_eq!(f.project.dump_count(), 0);
    }

    #[tokio::test]
    async fn lifecycle_actions_post_empty_bodies() {
        let mut f = fixture();
        f.node.start().await.unwrap();
        f.node.stop().await.unwrap();
        f.node.suspend().await.unwrap();
        f.node.reload().await.unwrap();

        let base = format!("/projects/{}/vpcs/nodes/{}", f.project.id(), f.node.id());
        let expected: Vec<Call> = ["start", "stop", "suspend", "reload"]
            .into_iter()
            .map(|action| Call::Post {
                path: format!("{base}/{action}"),
                body: None,
                timeout: RequestTimeout::Default,
            })
            .collect();
        assert_eq!(f.compute.calls(), expected);
    }

    #[tokio::test]
    async fn destroy_deletes_the_remote_instance() {
        let mut f = fixture();
        f.node.destroy().await.unwrap();
        assert_eq!(
            f.compute.calls(),
            vec![Call::Delete {
                path: format!("/projects/{}/vpcs/nodes/{}", f.project.id(), f.node.id()),
            }]
        );
    }

    #[tokio::test]
    async fn subresource_passthroughs() {
        let f = fixture();
        f.node
            .post("/test", Some(json!({"a": "b"})), RequestTimeout::Default)
            .await
            .unwrap();
        f.node.delete("/test").await.unwrap();

        let base = format!("/projects/{}/vpcs/nodes/{}", f.project.id(), f.node.id());
        assert_eq!(
            f.compute.calls(),
            vec![
                Call::Post {
                    path: format!("{base}/test"),
                    body: Some(json!({"a": "b"})),
                    timeout: RequestTimeout::Default,
                },
                Call::Delete {
                    path: format!("{base}/test"),
                },
            ]
        );
    }

    #[tokio::test]
    async fn auto_idlepc_uses_long_timeout() {
        let f = fixture_with(NodeOptions::new(NodeType::Dynamips));
        f.compute.respond_with(json!({"idlepc": "0x60606f54"}));

        let candidate = f.node.dynamips_auto_idlepc().await.unwrap();
        assert_eq!(candidate, "0x60606f54");
        assert_eq!(
            f.compute.calls(),
            vec![Call::Get {
                path: format!(
                    "/projects/{}/dynamips/nodes/{}/auto_idlepc",
                    f.project.id(),
                    f.node.id()
                ),
                timeout: RequestTimeout::Fixed(Duration::from_secs(240)),
            }]
        );
    }

    #[tokio::test]
    async fn idlepc_proposals_use_long_timeout() {
        let f = fixture_with(NodeOptions::new(NodeType::Dynamips));
        f.compute
            .respond_with(json!(["0x60606f54", "0x30ff6f37"]));

        let proposals = f.node.dynamips_idlepc_proposals().await.unwrap();
        assert_eq!(proposals, vec!["0x60606f54", "0x30ff6f37"]);
        assert_eq!(
            f.compute.calls(),
            vec![Call::Get {
                path: format!(
                    "/projects/{}/dynamips/nodes/{}/idlepc_proposals",
                    f.project.id(),
                    f.node.id()
                ),
                timeout: RequestTimeout::Fixed(Duration::from_secs(240)),
            }]
        );
    }

    #[tokio::test]
    async fn idlepc_operations_require_dynamips() {
        let f = fixture();
        let error = f.node.dynamips_auto_idlepc().await.unwrap_err();
        assert!(matches!(
            error,
            ControllerError::UnsupportedOperation {
                node_type: NodeType::Vpcs,
                operation: "auto_idlepc",
            }
        ));
        assert!(f.compute.calls().is_empty());
    }

    #[tokio::test]
    async fn upload_missing_image_streams_from_the_store() {
        let f = fixture_with(NodeOptions::new(NodeType::Qemu));
        std::fs::write(f.images.path().join("linux.img"), b"x").unwrap();

        f.node
            .upload_missing_image(NodeType::Qemu, "linux.img")
            .await
            .unwrap();

        assert_eq!(
            f.compute.calls(),
            vec![Call::Upload {
                path: "/qemu/images/linux.img".to_string(),
                source: f.images.path().join("linux.img"),
            }]
        );
    }
}
