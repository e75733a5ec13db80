mod account;
mod calendar;
mod helpers;
mod local;
mod routines;
mod sync;

use anyhow::{Result, bail};

use crate::config::{ClientSession, Config, StorageKind};
use crate::remote::RemoteClient;
use routinest_core::local_store::LocalRoutineStore;

pub(crate) use account::{cmd_change_password, cmd_login, cmd_logout, cmd_signup, cmd_whoami};
pub(crate) use calendar::cmd_calendar;
pub(crate) use local::{
    cmd_local_add, cmd_local_delete, cmd_local_edit, cmd_local_history, cmd_local_list,
    cmd_local_rollover, cmd_local_toggle,
};
pub(crate) use routines::{
    cmd_routines_add, cmd_routines_delete, cmd_routines_edit, cmd_routines_list,
    cmd_routines_set_completed,
};
pub(crate) use sync::cmd_sync;

/// Everything a client command needs: where data lives, which server to
/// talk to and which local storage backend to use.
pub(crate) struct ClientContext {
    pub config: Config,
    pub server: String,
    pub storage: StorageKind,
}

impl ClientContext {
    pub(crate) fn local_store(&self) -> Result<LocalRoutineStore> {
        self.config.open_local_store(self.storage)
    }

    pub(crate) fn anonymous_client(&self) -> Result<RemoteClient> {
        RemoteClient::new(&self.server, None)
    }

    pub(crate) fn session(&self) -> Result<ClientSession> {
        match self.config.load_session()? {
            Some(session) => Ok(session),
            None => bail!("Not logged in. Run `routinest login` first"),
        }
    }

    /// Client authenticated with the stored session, pointed at the server
    /// that issued it.
    pub(crate) fn client(&self) -> Result<RemoteClient> {
        let session = self.session()?;
        if session.server_url != self.server {
            tracing::debug!(
                session_server = %session.server_url,
                requested = %self.server,
                "using the server the session was issued by"
            );
        }
        RemoteClient::new(&session.server_url, Some(session.token))
    }
}
