use tracing::{debug, info, instrument, warn};

use crate::api::ApiClient;
use crate::filter::StatusFilter;
use crate::notify::Notification;
use crate::task::{Task, TaskCreate, TaskUpdate};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskForm {
    pub title: String,
    pub description: String,
}

impl TaskForm {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn from_task(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone().unwrap_or_default(),
        }
    }

    fn create_body(&self) -> TaskCreate {
        TaskCreate {
            title: self.title.trim().to_string(),
            description: if self.description.trim().is_empty() {
                None
            } else {
                Some(self.description.clone())
            },
        }
    }

    fn update_body(&self) -> TaskUpdate {
        TaskUpdate {
            title: Some(self.title.trim().to_string()),
            description: Some(self.description.clone()),
            completed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Editor {
    pub editing: Option<Task>,
    pub form: TaskForm,
}

#[derive(Debug)]
pub struct Dashboard {
    client: ApiClient,
    tasks: Vec<Task>,
    loading: bool,
    filter: StatusFilter,
    editor: Option<Editor>,
    submitting: bool,
    notification: Option<Notification>,
    issued_seq: u64,
    applied_seq: u64,
}

impl Dashboard {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            tasks: vec![],
            loading: false,
            filter: StatusFilter::All,
            editor: None,
            submitting: false,
            notification: None,
            issued_seq: 0,
            applied_seq: 0,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn filter(&self) -> StatusFilter {
        self.filter
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn editor(&self) -> Option<&Editor> {
        self.editor.as_ref()
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    pub fn take_notification(&mut self) -> Option<Notification> {
        self.notification.take()
    }

    pub fn pending_count(&self) -> usize {
        self.tasks.iter().filter(|task| !task.completed).count()
    }

    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|task| task.completed).count()
    }

    pub fn open_create(&mut self) {
        self.editor = Some(Editor {
            editing: None,
            form: TaskForm::default(),
        });
    }

    pub fn open_edit(&mut self, task: Task) {
        self.editor = Some(Editor {
            form: TaskForm::from_task(&task),
            editing: Some(task),
        });
    }

    pub fn close_editor(&mut self) {
        self.editor = None;
    }

    pub fn begin_reload(&mut self) -> u64 {
        self.issued_seq += 1;
        self.issued_seq
    }

    pub fn apply_reload(&mut self, seq: u64, tasks: Vec<Task>) -> bool {
        if seq <= self.applied_seq {
            debug!(seq, applied = self.applied_seq, "discarding stale reload");
            return false;
        }
        self.applied_seq = seq;
        self.tasks = tasks;
        true
    }

    #[instrument(skip(self))]
    pub async fn load(&mut self) {
        let seq = self.begin_reload();
        self.loading = true;

        match self.client.list_tasks(self.filter.completed_param()).await {
            Ok(tasks) => {
                if self.apply_reload(seq, tasks) {
                    debug!(seq, count = self.tasks.len(), "task list reloaded");
                }
            }
            Err(err) => {
                warn!(error = %err, filter = %self.filter, "load tasks failed");
                self.notify(Notification::error("Failed to load tasks"));
            }
        }

        self.loading = false;
    }

    #[instrument(skip(self))]
    pub async fn set_filter(&mut self, filter: StatusFilter) {
        info!(filter = %filter, "filter changed");
        self.filter = filter;
        self.load().await;
    }

    #[instrument(skip(self, form), fields(title_len = form.title.len()))]
    pub async fn create(&mut self, form: TaskForm) {
        if self.submitting {
            debug!("submit already in progress; ignoring create");
            return;
        }
        if form.title.trim().is_empty() {
            info!("create rejected: empty title");
            self.notify(Notification::error("Title is required"));
            return;
        }

        self.editor = Some(Editor {
            editing: None,
            form: form.clone(),
        });
        self.submitting = true;

        match self.client.create_task(&form.create_body()).await {
            Ok(task) => {
                info!(id = task.id, "task created");
                self.editor = None;
                self.notify(Notification::success("Task created successfully"));
                self.load().await;
            }
            Err(err) => {
                warn!(error = %err, "create task failed");
                self.notify(Notification::error("Failed to create task"));
            }
        }

        self.submitting = false;
    }

    #[instrument(skip(self, form), fields(title_len = form.title.len()))]
    pub async fn update(&mut self, form: TaskForm) {
        let Some(editing) = self.editor.as_ref().and_then(|editor| editor.editing.clone()) else {
            debug!("update ignored: no task is being edited");
            return;
        };

        if self.submitting {
            debug!("submit already in progress; ignoring update");
            return;
        }
        if form.title.trim().is_empty() {
            info!("update rejected: empty title");
            self.notify(Notification::error("Title is required"));
            return;
        }

        if let Some(editor) = self.editor.as_mut() {
            editor.form = form.clone();
        }
        self.submitting = true;

        match self.client.update_task(editing.id, &form.update_body()).await {
            Ok(task) => {
                info!(id = task.id, "task updated");
                self.editor = None;
                self.notify(Notification::success("Task updated successfully"));
                self.load().await;
            }
            Err(err) => {
                warn!(error = %err, id = editing.id, "update task failed");
                self.notify(Notification::error("Failed to update task"));
            }
        }

        self.submitting = false;
    }

    #[instrument(skip(self))]
    pub async fn toggle(&mut self, id: i64) {
        match self.client.toggle_task(id).await {
            Ok(task) => {
                debug!(id, completed = task.completed, "task toggled");
                self.load().await;
            }
            Err(err) => {
                warn!(error = %err, id, "toggle task failed");
                self.notify(Notification::error("Failed to update task"));
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn delete(&mut self, id: i64, confirmed: bool) {
        if !confirmed {
            info!(id, "delete cancelled");
            return;
        }

        match self.client.delete_task(id).await {
            Ok(_) => {
                info!(id, "task deleted");
                self.notify(Notification::success("Task deleted successfully"));
                self.load().await;
            }
            Err(err) => {
                warn!(error = %err, id, "delete task failed");
                self.notify(Notification::error("Failed to delete task"));
            }
        }
    }

    fn notify(&mut self, notification: Notification) {
        debug!(kind = ?notification.kind, message = %notification.message, "notification set");
        self.notification = Some(notification);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{Dashboard, TaskForm};
    use crate::api::ApiClient;
    use crate::filter::StatusFilter;
    use crate::notify::NotifyKind;
    use crate::task::Task;

    fn dashboard_for(server: &MockServer) -> Dashboard {
        let client = ApiClient::new(server.uri(), None).unwrap();
        Dashboard::new(client)
    }

    fn task(id: i64, title: &str, completed: bool) -> Task {
        Task {
            id,
            title: title.to_string(),
            description: None,
            completed,
            extra: BTreeMap::new(),
        }
    }

    fn task_json(id: i64, title: &str, completed: bool) -> serde_json::Value {
        json!({ "id": id, "title": title, "description": null, "completed": completed })
    }

    #[tokio::test]
    async fn blank_title_create_fires_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tasks"))
            .respond_with(ResponseTemplate::new(201).set_body_json(task_json(1, "x", false)))
            .expect(0)
            .mount(&server)
            .await;

        let mut dashboard = dashboard_for(&server);
        dashboard.open_create();
        dashboard.create(TaskForm::new("   ", "details")).await;

        assert!(dashboard.editor().is_some());
        assert_eq!(
            dashboard.notification().map(|n| n.kind),
            Some(NotifyKind::Error)
        );
    }

    #[tokio::test]
    async fn second_create_while_submitting_is_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tasks"))
            .respond_with(ResponseTemplate::new(201).set_body_json(task_json(1, "x", false)))
            .expect(0)
            .mount(&server)
            .await;

        let mut dashboard = dashboard_for(&server);
        dashboard.submitting = true;
        dashboard.create(TaskForm::new("real title", "")).await;

        assert!(dashboard.notification().is_none());
    }

    #[tokio::test]
    async fn create_success_closes_editor_and_reloads_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tasks"))
            .respond_with(ResponseTemplate::new(201).set_body_json(task_json(3, "buy milk", false)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([task_json(3, "buy milk", false)])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut dashboard = dashboard_for(&server);
        dashboard.open_create();
        dashboard.create(TaskForm::new("buy milk", "")).await;

        assert!(dashboard.editor().is_none());
        assert_eq!(
            dashboard.notification().map(|n| n.kind),
            Some(NotifyKind::Success)
        );
        assert_eq!(dashboard.tasks(), &[task(3, "buy milk", false)]);
    }

    #[tokio::test]
    async fn create_failure_keeps_editor_and_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tasks"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({ "detail": "boom" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let mut dashboard = dashboard_for(&server);
        dashboard.open_create();
        dashboard
            .create(TaskForm::new("keep me", "and my description"))
            .await;

        let editor = dashboard.editor().expect("editor should stay open");
        assert_eq!(editor.form.title, "keep me");
        assert_eq!(editor.form.description, "and my description");
        assert_eq!(
            dashboard.notification().map(|n| n.message.as_str()),
            Some("Failed to create task")
        );
        assert!(!dashboard.is_submitting());
    }

    #[tokio::test]
    async fn load_failure_keeps_previous_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([task_json(1, "keep", false)])),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let mut dashboard = dashboard_for(&server);
        dashboard.load().await;
        assert_eq!(dashboard.tasks().len(), 1);

        dashboard.load().await;
        assert_eq!(dashboard.tasks(), &[task(1, "keep", false)]);
        assert_eq!(
            dashboard.notification().map(|n| n.message.as_str()),
            Some("Failed to load tasks")
        );
        assert!(!dashboard.is_loading());
    }

    #[test]
    fn stale_reload_is_discarded() {
        let client = ApiClient::new("http://127.0.0.1:9", None).unwrap();
        let mut dashboard = Dashboard::new(client);

        let before_delete = dashboard.begin_reload();
        let after_delete = dashboard.begin_reload();

        assert!(dashboard.apply_reload(after_delete, vec![task(1, "kept", false)]));
        assert!(!dashboard.apply_reload(
            before_delete,
            vec![task(1, "kept", false), task(5, "deleted", true)]
        ));

        assert_eq!(dashboard.tasks(), &[task(1, "kept", false)]);
    }

    #[tokio::test]
    async fn update_without_editing_task_is_a_noop() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/tasks/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(task_json(1, "x", false)))
            .expect(0)
            .mount(&server)
            .await;

        let mut dashboard = dashboard_for(&server);
        dashboard.update(TaskForm::new("anything", "")).await;

        assert!(dashboard.notification().is_none());
    }

    #[tokio::test]
    async fn update_success_reloads_and_clears_editor() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/tasks/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(task_json(2, "renamed", false)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([task_json(2, "renamed", false)])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut dashboard = dashboard_for(&server);
        dashboard.open_edit(task(2, "old name", false));
        dashboard.update(TaskForm::new("renamed", "")).await;

        assert!(dashboard.editor().is_none());
        assert_eq!(dashboard.tasks(), &[task(2, "renamed", false)]);
    }

    #[tokio::test]
    async fn delete_without_confirmation_fires_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/tasks/5"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let mut dashboard = dashboard_for(&server);
        dashboard.delete(5, false).await;

        assert!(dashboard.notification().is_none());
    }

    #[tokio::test]
    async fn delete_confirmed_reloads_the_list() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/tasks/5"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let mut dashboard = dashboard_for(&server);
        let seq = dashboard.begin_reload();
        dashboard.apply_reload(seq, vec![task(5, "doomed", false)]);
        dashboard.delete(5, true).await;

        assert!(dashboard.tasks().is_empty());
        assert_eq!(
            dashboard.notification().map(|n| n.kind),
            Some(NotifyKind::Success)
        );
    }

    #[tokio::test]
    async fn toggle_success_reloads_exactly_once() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/tasks/7/complete"))
            .respond_with(ResponseTemplate::new(200).set_body_json(task_json(7, "flip", true)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([task_json(7, "flip", true)])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut dashboard = dashboard_for(&server);
        dashboard.toggle(7).await;

        assert_eq!(dashboard.tasks(), &[task(7, "flip", true)]);
        assert!(dashboard.notification().is_none());
    }

    #[tokio::test]
    async fn toggle_failure_shows_generic_update_error() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/tasks/8/complete"))
            .respond_with(ResponseTemplate::new(500).set_body_string(""))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let mut dashboard = dashboard_for(&server);
        dashboard.toggle(8).await;

        assert_eq!(
            dashboard.notification().map(|n| n.message.as_str()),
            Some("Failed to update task")
        );
    }

    #[tokio::test]
    async fn filter_change_issues_filtered_reload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .and(query_param("completed", "false"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([task_json(1, "open", false)])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut dashboard = dashboard_for(&server);
        dashboard.set_filter(StatusFilter::Pending).await;

        assert_eq!(dashboard.filter(), StatusFilter::Pending);
        assert_eq!(dashboard.tasks().len(), 1);
    }

    #[test]
    fn counts_derive_from_current_list() {
        let client = ApiClient::new("http://127.0.0.1:9", None).unwrap();
        let mut dashboard = Dashboard::new(client);
        let seq = dashboard.begin_reload();
        dashboard.apply_reload(
            seq,
            vec![
                task(1, "a", false),
                task(2, "b", true),
                task(3, "c", false),
            ],
        );

        assert_eq!(dashboard.pending_count(), 2);
        assert_eq!(dashboard.completed_count(), 1);
    }
}
