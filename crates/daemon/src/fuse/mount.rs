//! Background FUSE sessions

use std::path::Path;

use fuser::{BackgroundSession, MountOption, Session, SessionUnmounter};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::SubFs;
use crate::adapter::MountAdapter;
use crate::lifecycle::{MountHandle, Mounter};

/// Mounts the filesystem on a background session thread
#[derive(Debug, Clone)]
pub struct FuseMounter {
    runtime: Handle,
}

impl FuseMounter {
    /// Mounter whose filesystem tasks run on the current tokio runtime.
    pub fn current() -> std::io::Result<Self> {
        let runtime = Handle::try_current().map_err(std::io::Error::other)?;
        Ok(Self { runtime })
    }

    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Mounter for FuseMounter {
    fn mount(
        &self,
        adapter: MountAdapter,
        mount_point: &Path,
        session: CancellationToken,
    ) -> std::io::Result<Box<dyn MountHandle>> {
        let fs = SubFs::new(adapter, self.runtime.clone(), session);
        let options = [
            MountOption::RO,
            MountOption::FSName("subfs".to_string()),
            MountOption::Subtype("subsonic".to_string()),
        ];

        let mut session = Session::new(fs, mount_point, &options)?;
        let unmounter = session.unmount_callable();
        let background = session.spawn()?;

        tracing::info!(path = %mount_point.display(), "Mounted filesystem");
        Ok(Box::new(FuseMount {
            unmounter,
            background: Some(background),
        }))
    }
}

/// A mounted session running on its own thread
pub struct FuseMount {
    unmounter: SessionUnmounter,
    background: Option<BackgroundSession>,
}

impl MountHandle for FuseMount {
    fn unmount(&mut self) -> std::io::Result<()> {
        self.unmounter.unmount()?;
        // The session loop ends once the kernel connection is gone
        drop(self.background.take());
        Ok(())
    }
}
