//! Assembles a `docker run` invocation for a containerized step
//!.
//!
//! This module only builds the argument vector; spawning and timeout/signal
//! handling stay in [`crate::run_with_timeout`] and [`crate::SignalGuard`]
//! so a host (non-container) step and a containerized one share the same
//! execution loop.

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};

/// A single `--volume=<src>:<dst>[:ro]` bind mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub host_source: Utf8PathBuf,
    pub guest_target: Utf8PathBuf,
    pub read_only: bool,
}

impl VolumeMount {
    fn docker_arg(&self) -> String {
        if self.read_only {
            format!("--volume={}:{}:ro", self.host_source, self.guest_target)
        } else {
            format!("--volume={}:{}", self.host_source, self.guest_target)
        }
    }
}

/// Everything the phase runner has accumulated for one containerized step
/// by the time it's ready to spawn `docker run`.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub image: String,
    pub uid: u32,
    pub gid: u32,
    pub tty: bool,
    pub volumes: Vec<VolumeMount>,
    pub volumes_from: Vec<String>,
    pub docker_in_docker: bool,
    pub docker_socket_group_gid: Option<u32>,
    /// `KEY=VAL` environment, already resolved.
    pub env: Vec<(String, String)>,
    /// Raw passthrough flags appended verbatim after everything else.
    pub extra_docker_args: Vec<String>,
    pub argv: Vec<String>,
}

impl ContainerSpec {
    /// Builds the `docker run` command this spec describes. `cidfile` is
    /// the path the container id is written to, so a signal handler can
    /// `docker stop`/`docker kill` it by id without parsing `docker run`'s
    /// own stdout.
    pub fn command(&self, cwd: &Utf8Path, cidfile: &Utf8Path) -> Command {
        let mut cmd = Command::new("docker");
        cmd.current_dir(cwd);
        cmd.arg("run")
            .arg("--rm")
            .arg(format!("--cidfile={cidfile}"))
            .arg("--net=host")
            .arg("--cap-add=SYS_PTRACE")
            .arg(format!("--tmpfs=/home/sandbox:exec,uid={},gid={}", self.uid, self.gid))
            .arg(format!("--user={}:{}", self.uid, self.gid))
            .arg("--workdir=/code");

        if self.tty {
            cmd.arg("--tty");
        }

        for (key, value) in &self.env {
            cmd.arg(format!("--env={key}={value}"));
        }

        for mount in &self.volumes {
            cmd.arg(mount.docker_arg());
        }

        for cid in &self.volumes_from {
            cmd.arg(format!("--volumes-from={cid}"));
        }

        if self.docker_in_docker {
            cmd.arg("--volume=/var/run/docker.sock:/var/run/docker.sock");
            if let Some(gid) = self.docker_socket_group_gid {
                cmd.arg(format!("--group-add={gid}"));
            }
        }

        for arg in &self.extra_docker_args {
            cmd.arg(arg);
        }

        cmd.arg(&self.image);
        cmd.args(&self.argv);
        cmd
    }
}

/// Whether `/var/run/docker.sock` is group-accessible but not
/// world-accessible, and if so its owning group id — the condition under
/// which `docker-in-docker` must add that group to the container
///.
#[cfg(unix)]
pub fn docker_socket_group_gid(socket: &Utf8Path) -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    let metadata = std::fs::metadata(socket).ok()?;
    let mode = metadata.mode();
    let group_read_write = mode & 0o060 == 0o060;
    let world_read_write = mode & 0o006 == 0o006;
    if group_read_write && !world_read_write {
        Some(metadata.gid())
    } else {
        None
    }
}

#[cfg(not(unix))]
pub fn docker_socket_group_gid(_socket: &Utf8Path) -> Option<u32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_spec() -> ContainerSpec {
        ContainerSpec {
            image: "example/image:1.0".to_string(),
            uid: 1000,
            gid: 1000,
            tty: false,
            volumes: vec![VolumeMount {
                host_source: "/host/code".into(),
                guest_target: "/code".into(),
                read_only: false,
            }],
            volumes_from: Vec::new(),
            docker_in_docker: false,
            docker_socket_group_gid: None,
            env: vec![("HOME".to_string(), "/home/sandbox".to_string())],
            extra_docker_args: Vec::new(),
            argv: vec!["echo".to_string(), "hi".to_string()],
        }
    }

    fn rendered(spec: &ContainerSpec) -> Vec<String> {
        let cmd = spec.command(Utf8Path::new("/work"), Utf8Path::new("/tmp/cid"));
        cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect()
    }

    #[test]
    fn mounts_code_volume_and_sets_workdir() {
        let args = rendered(&base_spec());
        assert!(args.contains(&"--volume=/host/code:/code".to_string()));
        assert!(args.contains(&"--workdir=/code".to_string()));
    }

    #[test]
    fn read_only_volume_appends_ro_suffix() {
        let mut spec = base_spec();
        spec.volumes[0].read_only = true;
        let args = rendered(&spec);
        assert!(args.contains(&"--volume=/host/code:/code:ro".to_string()));
    }

    #[test]
    fn docker_in_docker_binds_socket() {
        let mut spec = base_spec();
        spec.docker_in_docker = true;
        spec.docker_socket_group_gid = Some(999);
        let args = rendered(&spec);
        assert!(args.contains(&"--volume=/var/run/docker.sock:/var/run/docker.sock".to_string()));
        assert!(args.contains(&"--group-add=999".to_string()));
    }

    #[test]
    fn tty_flag_only_set_when_requested() {
        assert!(!rendered(&base_spec()).contains(&"--tty".to_string()));
        let mut spec = base_spec();
        spec.tty = true;
        assert!(rendered(&spec).contains(&"--tty".to_string()));
    }

    #[test]
    fn argv_and_image_come_last() {
        let args = rendered(&base_spec());
        let image_pos = args.iter().position(|a| a == "example/image:1.0").unwrap();
        assert_eq!(args[image_pos + 1], "echo");
        assert_eq!(args[image_pos + 2], "hi");
    }
}
