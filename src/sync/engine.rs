//! The owner task of the registration record.
//!
//! Sync flow:
//! - Idle → (display name is the placeholder) → FetchingName → Upserting → Idle
//! - Idle → Upserting → Idle
//!
//! At most one sync is in flight. A trigger for the in-flight payload is
//! dropped; any other trigger marks a resync that runs with the latest
//! record once the in-flight request completes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::platform::PushRegistrar;
use crate::registry::{RegistryError, RemoteRegistry};
use crate::store::{hydrate, PersistedSettings, SettingsStore};
use crate::types::{AuthorizationStatus, RegistrationRecord, SyncState, UpsertOutcome};

use super::remote::{fetch_remote_name, refresh_admin_flag};
use super::{SyncCommand, SyncHandle};

// ============================================================================
// Internal state
// ============================================================================

/// The payload a sync is working on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SyncKey {
    user_id: String,
    device_token: String,
    display_name: String,
}

impl From<&RegistrationRecord> for SyncKey {
    fn from(record: &RegistrationRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            device_token: record.device_token.clone(),
            display_name: record.display_name.clone(),
        }
    }
}

impl SyncKey {
    fn same_identity(&self, record: &RegistrationRecord) -> bool {
        self.user_id == record.user_id && self.device_token == record.device_token
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    FetchingName(SyncKey),
    Upserting(SyncKey),
}

/// Results reported back by spawned network tasks.
#[derive(Debug)]
enum Completion {
    NameFetched {
        key: SyncKey,
        name: Option<String>,
    },
    Upserted {
        key: SyncKey,
        result: Result<UpsertOutcome, RegistryError>,
    },
    AdminRefreshed {
        user_id: String,
        admin: Option<bool>,
    },
}

enum Event {
    Command(Option<SyncCommand>),
    Completion(Completion),
}

// ============================================================================
// RegistrationSynchronizer
// ============================================================================

/// Owns the registration record and reconciles it with the registry.
pub struct RegistrationSynchronizer<R, S> {
    state: SyncState,
    registry: Arc<R>,
    store: S,
    registrar: Option<Arc<dyn PushRegistrar>>,
    bundle_id: String,
    request_timeout: Duration,
    commands: mpsc::UnboundedReceiver<SyncCommand>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    state_tx: watch::Sender<SyncState>,
    phase: Phase,
    resync_pending: bool,
    admin_refreshes: usize,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

impl<R, S> RegistrationSynchronizer<R, S>
where
    R: RemoteRegistry,
    S: SettingsStore,
{
    /// Creates a synchronizer hydrated from `store` and its handle.
    ///
    /// The synchronizer does nothing until [`Self::run`] is spawned.
    pub fn new(config: &SyncConfig, store: S, registry: Arc<R>) -> (Self, SyncHandle) {
        let record = hydrate(&store);
        debug!(
            "登録情報を読み込みました: user_id={:?}, confirmed={}",
            record.user_id, record.remote_registration_confirmed
        );

        let state = SyncState {
            record,
            ..SyncState::default()
        };
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(state.clone());

        let synchronizer = Self {
            state,
            registry,
            store,
            registrar: None,
            bundle_id: config.bundle_id.clone(),
            request_timeout: config.request_timeout(),
            commands: command_rx,
            completion_tx,
            completion_rx,
            state_tx,
            phase: Phase::Idle,
            resync_pending: false,
            admin_refreshes: 0,
            idle_waiters: Vec::new(),
        };

        (synchronizer, SyncHandle::new(command_tx, state_rx))
    }

    /// Registers the hook used when permission is granted before the
    /// device is registered with the push service.
    #[must_use]
    pub fn with_push_registrar(mut self, registrar: Arc<dyn PushRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    /// Runs until every [`SyncHandle`] is dropped and outstanding network
    /// work has completed.
    pub async fn run(mut self) {
        let mut accepting = true;

        loop {
            if !accepting && self.is_idle() {
                break;
            }

            let event = tokio::select! {
                command = self.commands.recv(), if accepting => Event::Command(command),
                Some(completion) = self.completion_rx.recv() => Event::Completion(completion),
                else => break,
            };

            match event {
                Event::Command(Some(command)) => self.handle_command(command),
                Event::Command(None) => {
                    debug!("すべてのハンドルが破棄されました。残りの処理を待機します");
                    accepting = false;
                }
                Event::Completion(completion) => self.handle_completion(completion),
            }

            self.notify_idle();
        }

        debug!("同期エンジンを終了します");
    }

    // ===== Commands =====

    fn handle_command(&mut self, command: SyncCommand) {
        match command {
            SyncCommand::SetDeviceToken(token) => self.set_device_token(token),
            SyncCommand::SetUserId(user_id) => self.set_user_id(user_id),
            SyncCommand::SetDisplayName(name) => self.set_display_name(name),
            SyncCommand::SetLocalAuthConfirmed(confirmed) => {
                self.set_local_auth_confirmed(confirmed)
            }
            SyncCommand::TokenRegistrationFailed(reason) => {
                self.token_registration_failed(&reason)
            }
            SyncCommand::PermissionChanged(status) => self.permission_changed(status),
            SyncCommand::RemoteContent(size) => self.remote_content(size),
            SyncCommand::SyncToRemote => self.trigger_sync(),
            SyncCommand::WaitIdle(waiter) => self.idle_waiters.push(waiter),
        }
    }

    fn set_device_token(&mut self, token: String) {
        info!("デバイストークンを受信しました");
        debug!("デバイストークン: {}", token);

        let record = &mut self.state.record;
        record.device_token = token;
        record.remote_registration_confirmed = false;
        self.state.push_registered = true;
        self.persist();
        self.publish();

        if !self.state.record.user_id.is_empty() {
            self.trigger_sync();
        }
    }

    fn set_user_id(&mut self, user_id: String) {
        if self.state.record.user_id == user_id {
            debug!("ユーザーIDに変更はありません");
            return;
        }
        info!("ユーザーIDを更新しました: {}", user_id);

        let record = &mut self.state.record;
        record.user_id = user_id;
        record.remote_registration_confirmed = false;
        self.persist();
        self.publish();

        if !self.state.record.device_token.is_empty() {
            self.trigger_sync();
        }
    }

    fn set_display_name(&mut self, name: String) {
        if self.state.record.display_name == name {
            debug!("表示名に変更はありません");
            return;
        }
        info!("表示名を更新しました: {}", name);

        self.state.record.display_name = name;
        self.persist();
        self.publish();

        if self.state.gating_decision() {
            self.trigger_sync();
        }
    }

    fn set_local_auth_confirmed(&mut self, confirmed: bool) {
        if self.state.record.local_auth_flow_confirmed == confirmed {
            return;
        }
        info!("サインイン状態を更新しました: {}", confirmed);

        self.state.record.local_auth_flow_confirmed = confirmed;
        self.persist();
        self.publish();
    }

    fn token_registration_failed(&mut self, reason: &str) {
        error!("リモート通知の登録に失敗しました: {}", reason);
        self.state.push_registered = false;
        self.publish();
    }

    fn permission_changed(&mut self, status: AuthorizationStatus) {
        debug!("通知許可ステータスを更新しました: {}", status.as_str());
        self.state.permission = status;
        self.publish();

        if status.is_allowed() && !self.state.push_registered {
            let Some(registrar) = &self.registrar else {
                return;
            };
            match registrar.register_for_remote_notifications() {
                Ok(()) => debug!("リモート通知の登録を要求しました"),
                Err(e) => warn!("リモート通知の登録を開始できませんでした: {}", e),
            }
        }
    }

    fn remote_content(&mut self, size: f64) {
        debug!("コンテンツサイズを更新しました: {}", size);
        self.state.content_size = size;
        self.publish();
    }

    // ===== Sync =====

    fn trigger_sync(&mut self) {
        if !self.state.record.has_identity() {
            debug!("ユーザーIDまたはデバイストークンが未設定のため同期をスキップします");
            return;
        }

        let key = SyncKey::from(&self.state.record);
        match &self.phase {
            Phase::Idle => self.start_sync(),
            Phase::FetchingName(in_flight) | Phase::Upserting(in_flight) => {
                if *in_flight == key {
                    debug!("同じ内容の同期が進行中のためスキップします");
                } else {
                    debug!("同期が進行中のため完了後に再同期します");
                    self.resync_pending = true;
                }
            }
        }
    }

    fn start_sync(&mut self) {
        self.resync_pending = false;
        let key = SyncKey::from(&self.state.record);

        if self.state.record.has_default_name() {
            self.start_name_fetch(key);
        } else {
            self.start_upsert(key);
        }
    }

    fn start_name_fetch(&mut self, key: SyncKey) {
        debug!("リモートの表示名を確認します");
        self.phase = Phase::FetchingName(key.clone());

        let registry = Arc::clone(&self.registry);
        let completions = self.completion_tx.clone();
        let limit = self.request_timeout;
        tokio::spawn(async move {
            let name = fetch_remote_name(registry.as_ref(), &key.user_id, limit).await;
            let _ = completions.send(Completion::NameFetched { key, name });
        });
    }

    fn start_upsert(&mut self, key: SyncKey) {
        debug!("リモートに登録します: user_id={}", key.user_id);
        self.phase = Phase::Upserting(key.clone());

        let request = self.state.record.upsert_request(&self.bundle_id);
        let registry = Arc::clone(&self.registry);
        let completions = self.completion_tx.clone();
        let limit = self.request_timeout;
        tokio::spawn(async move {
            let result = match timeout(limit, registry.upsert(&key.user_id, &request)).await {
                Ok(result) => result,
                Err(_) => Err(RegistryError::Timeout(limit.as_secs())),
            };
            let _ = completions.send(Completion::Upserted { key, result });
        });
    }

    // ===== Completions =====

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::NameFetched { key, name } => self.name_fetched(key, name),
            Completion::Upserted { key, result } => self.upserted(key, result),
            Completion::AdminRefreshed { user_id, admin } => self.admin_refreshed(user_id, admin),
        }
    }

    fn name_fetched(&mut self, key: SyncKey, name: Option<String>) {
        self.phase = Phase::Idle;

        if key.user_id != self.state.record.user_id {
            debug!("表示名の取得中にユーザーIDが変わったため同期をやり直します");
            self.resync_pending = false;
            self.trigger_sync();
            return;
        }

        if let Some(name) = name {
            if self.state.record.has_default_name() && self.state.record.display_name != name {
                info!("リモートの表示名を採用しました: {}", name);
                self.state.record.display_name = name;
                self.persist();
                self.publish();
            }
        }

        if !self.state.record.has_identity() {
            debug!("デバイストークンが未設定のため同期を中止します");
            self.resync_pending = false;
            return;
        }

        // Continue with the latest record; anything queued meanwhile is covered.
        self.resync_pending = false;
        let key = SyncKey::from(&self.state.record);
        self.start_upsert(key);
    }

    fn upserted(&mut self, key: SyncKey, result: Result<UpsertOutcome, RegistryError>) {
        self.phase = Phase::Idle;

        if !key.same_identity(&self.state.record) {
            debug!("古い登録結果を破棄します: user_id={}", key.user_id);
        } else {
            match result {
                Ok(UpsertOutcome::Rejected(status)) => {
                    warn!("リモート登録が拒否されました: status={}", status);
                    self.set_remote_confirmed(false);
                }
                Ok(outcome) => {
                    info!("リモート登録に成功しました: {}", outcome.as_str());
                    if key.display_name == self.state.record.display_name {
                        self.set_remote_confirmed(true);
                    } else {
                        self.resync_pending = true;
                    }
                }
                Err(e) => {
                    error!("リモート登録に失敗しました: {}", e);
                }
            }
        }

        if self.resync_pending {
            debug!("保留中の再同期を実行します");
            self.resync_pending = false;
            self.trigger_sync();
        }
    }

    fn set_remote_confirmed(&mut self, confirmed: bool) {
        let was_confirmed = self.state.record.remote_registration_confirmed;
        if was_confirmed == confirmed {
            return;
        }

        self.state.record.remote_registration_confirmed = confirmed;
        self.persist();
        self.publish();

        if confirmed {
            self.start_admin_refresh();
        }
    }

    fn start_admin_refresh(&mut self) {
        self.admin_refreshes += 1;

        let user_id = self.state.record.user_id.clone();
        let registry = Arc::clone(&self.registry);
        let completions = self.completion_tx.clone();
        let limit = self.request_timeout;
        tokio::spawn(async move {
            let admin = refresh_admin_flag(registry.as_ref(), &user_id, limit).await;
            let _ = completions.send(Completion::AdminRefreshed { user_id, admin });
        });
    }

    fn admin_refreshed(&mut self, user_id: String, admin: Option<bool>) {
        self.admin_refreshes = self.admin_refreshes.saturating_sub(1);

        if user_id != self.state.record.user_id {
            debug!("別ユーザーの管理者フラグを破棄します");
            return;
        }
        if let Some(admin) = admin {
            debug!("管理者フラグ: {}", admin);
            self.state.record.is_admin = admin;
            self.publish();
        }
    }

    // ===== Helpers =====

    fn is_idle(&self) -> bool {
        self.phase == Phase::Idle && !self.resync_pending && self.admin_refreshes == 0
    }

    fn notify_idle(&mut self) {
        if self.idle_waiters.is_empty() || !self.is_idle() {
            return;
        }
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn persist(&self) {
        let settings = PersistedSettings::from(&self.state.record);
        if let Err(e) = self.store.save(&settings) {
            error!("設定の保存に失敗しました: {}", e);
        }
    }

    fn publish(&self) {
        let state = &self.state;
        self.state_tx.send_if_modified(|current| {
            if current == state {
                false
            } else {
                *current = state.clone();
                true
            }
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
