//! Registry lookups used by the synchronizer.
//!
//! Both lookups are best-effort: every failure collapses to `None` and is
//! logged, so the caller keeps its current value.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::registry::RemoteRegistry;
use crate::types::LookupOutcome;

/// Fetches the display name stored on the registry for `user_id`.
///
/// Returns `None` for 404, a malformed body, an empty name, or any
/// transport failure.
pub async fn fetch_remote_name<R>(registry: &R, user_id: &str, limit: Duration) -> Option<String>
where
    R: RemoteRegistry + ?Sized,
{
    match timeout(limit, registry.lookup(user_id)).await {
        Ok(Ok(LookupOutcome::Found(user))) => {
            let name = user.name.filter(|name| !name.is_empty());
            debug!("リモートの表示名: {:?}", name);
            name
        }
        Ok(Ok(LookupOutcome::NotFound)) => {
            debug!("リモートにユーザーが登録されていません: {}", user_id);
            None
        }
        Ok(Err(e)) if e.is_protocol() => {
            debug!("リモートの表示名を取得できませんでした: {}", e);
            None
        }
        Ok(Err(e)) => {
            warn!("リモートの表示名の取得に失敗しました: {}", e);
            None
        }
        Err(_) => {
            warn!(
                "リモートの表示名の取得がタイムアウトしました（{}秒）",
                limit.as_secs()
            );
            None
        }
    }
}

/// Fetches the admin flag stored on the registry for `user_id`.
///
/// `Some(true)` only for the string `"True"`; `None` when the lookup fails
/// or the field is missing.
pub async fn refresh_admin_flag<R>(registry: &R, user_id: &str, limit: Duration) -> Option<bool>
where
    R: RemoteRegistry + ?Sized,
{
    match timeout(limit, registry.lookup(user_id)).await {
        Ok(Ok(LookupOutcome::Found(user))) => user.admin_flag(),
        Ok(Ok(LookupOutcome::NotFound)) => {
            debug!("管理者フラグ: ユーザーが見つかりません");
            None
        }
        Ok(Err(e)) => {
            warn!("管理者フラグの取得に失敗しました: {}", e);
            None
        }
        Err(_) => {
            warn!(
                "管理者フラグの取得がタイムアウトしました（{}秒）",
                limit.as_secs()
            );
            None
        }
    }
}
