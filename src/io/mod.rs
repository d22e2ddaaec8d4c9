// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Background workloads on mounted volumes, and the checks run on them afterwards.
//!
//! Workloads are implemented by one bash script, `file_dir_ops.sh`, uploaded to each client once
//! per run and launched through [`Executor::run_async`].

use std::sync::Arc;

use {futures::future, log::{error, info, warn}, serde::Serialize};

use crate::{
    cluster::Cluster,
    error::Result,
    mount::Mount,
    remote::{quote, quote::join, Executor, IoProcess},
};

/// The workload script, as uploaded to clients.
pub const FILE_DIR_OPS: &str = include_str!("file_dir_ops.sh");

const SCRIPT_NAME: &str = "file_dir_ops.sh";

/// A workload to run on a mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Recipe {
    /// `dir_length` top-level directories `user<N>`, each the root of a tree `dir_depth` levels
    /// deep with `max_num_of_dirs` subdirectories and `num_of_files` files per directory.
    CreateDeepDirsWithFiles {
        dirname_start_num: u32,
        dir_depth: u32,
        dir_length: u32,
        max_num_of_dirs: u32,
        num_of_files: u32,
    },
    /// `count` files of `size` bytes (`head -c` syntax, e.g. `10M`) named `<base_name><N>` in
    /// `dir`, relative to the mount point.
    CreateFiles {
        count: u32,
        size: String,
        base_name: String,
        dir: String,
    },
    /// Extract the configured tarball into `linuxuntar` below each of `dirs`, relative to the
    /// mount point.
    LinuxUntar { dirs: Vec<String> },
    /// The `crefi` file generator.
    Crefi {
        num_of_files: u32,
        breadth: u32,
        depth: u32,
        file_type: String,
        fop: String,
    },
    /// Keep `file<start>`..`file<end>` in `dir` open, appending to them for `duration_secs`.
    OpenFileFd {
        start: u32,
        end: u32,
        duration_secs: u32,
        dir: String,
    },
}

impl Recipe {
    pub fn create_deep_dirs_with_files(
        dirname_start_num: u32,
        dir_depth: u32,
        dir_length: u32,
        max_num_of_dirs: u32,
        num_of_files: u32,
    ) -> Self {
        Recipe::CreateDeepDirsWithFiles {
            dirname_start_num,
            dir_depth,
            dir_length,
            max_num_of_dirs,
            num_of_files,
        }
    }

    /// The command that runs this recipe on `mountpoint`.
    pub fn command(&self, script: &str, mountpoint: &str, tarball: &str) -> String {
        let script = quote(script);
        let under = |rel: &str| {
            let rel = rel.trim_matches('/');
            if rel.is_empty() {
                mountpoint.to_string()
            } else {
                format!("{mountpoint}/{rel}")
            }
        };
        match self {
            Recipe::CreateDeepDirsWithFiles {
                dirname_start_num,
                dir_depth,
                dir_length,
                max_num_of_dirs,
                num_of_files,
            } => format!(
                "bash {script} create_deep_dirs_with_files --dirname-start-num {dirname_start_num} \
                 --dir-depth {dir_depth} --dir-length {dir_length} \
                 --max-num-of-dirs {max_num_of_dirs} --num-of-files {num_of_files} {}",
                quote(mountpoint)
            ),
            Recipe::CreateFiles {
                count,
                size,
                base_name,
                dir,
            } => format!(
                "bash {script} create_files -f {count} --fixed-file-size {} --base-file-name {} {}",
                quote(size),
                quote(base_name),
                quote(&under(dir))
            ),
            Recipe::LinuxUntar { dirs } => format!(
                "bash {script} untar {} {}",
                quote(tarball),
                join(dirs.iter().map(|d| under(d)))
            ),
            Recipe::Crefi {
                num_of_files,
                breadth,
                depth,
                file_type,
                fop,
            } => format!(
                "crefi --multi -n {num_of_files} -b {breadth} -d {depth} --max=10K --min=500 \
                 --random -T 5 -t {} --fop={} {}",
                quote(file_type),
                quote(fop),
                quote(mountpoint)
            ),
            Recipe::OpenFileFd {
                start,
                end,
                duration_secs,
                dir,
            } => format!(
                "bash {script} open_file_fd --start {start} --end {end} --duration {duration_secs} {}",
                quote(&under(dir))
            ),
        }
    }
}

/// Where the workload script lives on clients.
pub fn script_path(cluster: &Cluster) -> String {
    format!(
        "{}/{SCRIPT_NAME}",
        cluster.config().io.script_dir.trim_end_matches('/')
    )
}

/// Upload the workload script to every client in `clients` that does not have it yet. Clients
/// that already hold an identical copy are left alone.
pub async fn upload_scripts(cluster: &Cluster, clients: &[String]) -> Result<bool> {
    let executor = cluster.executor();
    let path = script_path(cluster);
    let uploads = clients
        .iter()
        .filter(|c| !cluster.scripts_uploaded(c))
        .map(|client| {
            let path = &path;
            async move {
                let current = executor
                    .run(client, &format!("cat {} 2>/dev/null", quote(path)))
                    .await?;
                let uploaded = if current.success() && current.stdout == FILE_DIR_OPS {
                    true
                } else {
                    executor
                        .upload(client, FILE_DIR_OPS.as_bytes(), path, 0o755)
                        .await?
                };
                if uploaded {
                    cluster.mark_scripts_uploaded(client);
                } else {
                    error!("could not upload {path} to {client}");
                }
                Ok::<bool, crate::error::Error>(uploaded)
            }
        });
    let mut all = true;
    for result in future::join_all(uploads).await {
        all &= result?;
    }
    Ok(all)
}

/// Remove the workload script from every client it was uploaded to, so that the next upload starts
/// from scratch.
pub async fn remove_scripts(cluster: &Cluster) -> Result<bool> {
    let executor = cluster.executor();
    let path = script_path(cluster);
    let command = format!("rm -f {}", quote(&path));
    let clients = cluster.take_scripts_uploaded();
    let removals = clients.iter().map(|client| {
        let (path, command) = (&path, &command);
        async move {
            let result = executor.run(client, command).await?;
            if !result.success() {
                error!("could not remove {path} from {client}: {}", result.stderr.trim());
            }
            Ok::<bool, crate::error::Error>(result.success())
        }
    });
    let mut all = true;
    for result in future::join_all(removals).await {
        all &= result?;
    }
    Ok(all)
}

/// Start `recipe` on `mount` in the background.
pub async fn run_io(cluster: &Cluster, mount: &Mount, recipe: &Recipe) -> Result<IoProcess> {
    let command = recipe.command(
        &script_path(cluster),
        &mount.mountpoint,
        &cluster.config().io.tarball,
    );
    info!("starting {recipe:?} on {}:{}", mount.client, mount.mountpoint);
    cluster.executor().run_async(&mount.client, &command)
}

/// Wait for every handle and report whether all of them exited with status 0. Never fails: a
/// handle whose host could not be reached counts as a failed workload.
pub async fn validate_io_procs(procs: &[Arc<IoProcess>]) -> bool {
    let results = future::join_all(procs.iter().map(|p| p.await_completion())).await;
    let mut all = true;
    for (proc, result) in procs.iter().zip(results) {
        match result {
            Ok(r) if r.success() => {}
            Ok(r) => {
                error!(
                    "I/O on {} failed (exit={}): {}",
                    proc.host(),
                    r.status,
                    r.stderr.trim()
                );
                all = false;
            }
            Err(e) => {
                error!("I/O on {} was lost: {e}", proc.host());
                all = false;
            }
        }
    }
    all
}

/// Wait for every handle to finish, ignoring exit statuses. False only when a handle could not be
/// waited for.
pub async fn wait_for_io_to_complete(procs: &[Arc<IoProcess>]) -> bool {
    let results = future::join_all(procs.iter().map(|p| p.await_completion())).await;
    results.iter().all(|r| {
        if let Err(e) = r {
            warn!("could not wait for I/O: {e}");
        }
        r.is_ok()
    })
}

/// The arequal checksum of every mount in `mounts`, in order. `None` if any mount could not be
/// checksummed.
pub async fn collect_mounts_arequal(
    cluster: &Cluster,
    mounts: &[Mount],
) -> Result<Option<Vec<String>>> {
    let script = quote(&script_path(cluster));
    let executor = cluster.executor();
    let runs = mounts.iter().map(|m| {
        let script = &script;
        async move {
            let command = format!("bash {script} arequal {}", quote(&m.mountpoint));
            executor.run(&m.client, &command).await
        }
    });
    let mut checksums = Vec::with_capacity(mounts.len());
    for (mount, result) in mounts.iter().zip(future::join_all(runs).await) {
        let result = result?;
        if !result.success() {
            error!(
                "arequal of {}:{} failed: {}",
                mount.client,
                mount.mountpoint,
                result.stderr.trim()
            );
            return Ok(None);
        }
        checksums.push(result.stdout.trim().to_string());
    }
    Ok(Some(checksums))
}

/// `stat` every entry of every mount. True when nothing failed.
pub async fn get_mounts_stat(cluster: &Cluster, mounts: &[Mount]) -> Result<bool> {
    let script = quote(&script_path(cluster));
    let executor = cluster.executor();
    let runs = mounts.iter().map(|m| {
        let script = &script;
        async move {
            let command = format!("bash {script} stat {}", quote(&m.mountpoint));
            executor.run(&m.client, &command).await
        }
    });
    let mut all = true;
    for result in future::join_all(runs).await {
        all &= result?.success();
    }
    Ok(all)
}

/// The capacity figures of `statvfs(2)` for a mounted filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Statvfs {
    pub f_blocks: u64,
    pub f_frsize: u64,
}

impl Statvfs {
    pub fn capacity(&self) -> u64 {
        self.f_blocks * self.f_frsize
    }
}

pub async fn get_statvfs(executor: &Executor, mount: &Mount) -> Result<Option<Statvfs>> {
    let command = format!("stat -f -c '%b %S' {}", quote(&mount.mountpoint));
    let result = executor.run(&mount.client, &command).await?;
    if !result.success() {
        return Ok(None);
    }
    let mut fields = result.stdout.split_whitespace().map(str::parse::<u64>);
    match (fields.next(), fields.next()) {
        (Some(Ok(f_blocks)), Some(Ok(f_frsize))) => Ok(Some(Statvfs { f_blocks, f_frsize })),
        _ => {
            warn!("unexpected statvfs output: '{}'", result.stdout.trim());
            Ok(None)
        }
    }
}

pub async fn file_md5(executor: &Executor, host: &str, path: &str) -> Result<Option<String>> {
    let result = executor
        .run(host, &format!("md5sum {}", quote(path)))
        .await?;
    if !result.success() {
        return Ok(None);
    }
    Ok(result.stdout.split_whitespace().next().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipe_commands() {
        let deep = Recipe::create_deep_dirs_with_files(10, 2, 3, 2, 5);
        assert_eq!(
            deep.command("/opt/io/file_dir_ops.sh", "/mnt/vol", "/t.tar"),
            "bash /opt/io/file_dir_ops.sh create_deep_dirs_with_files --dirname-start-num 10 \
             --dir-depth 2 --dir-length 3 --max-num-of-dirs 2 --num-of-files 5 /mnt/vol"
        );

        let untar = Recipe::LinuxUntar {
            dirs: vec!["a".into(), "/b/".into()],
        };
        assert_eq!(
            untar.command("s.sh", "/mnt/vol", "/root/linux.tar.xz"),
            "bash s.sh untar /root/linux.tar.xz /mnt/vol/a /mnt/vol/b"
        );

        let files = Recipe::CreateFiles {
            count: 500,
            size: "10M".into(),
            base_name: "file".into(),
            dir: String::new(),
        };
        assert_eq!(
            files.command("s.sh", "/mnt/vol", ""),
            "bash s.sh create_files -f 500 --fixed-file-size 10M --base-file-name file /mnt/vol"
        );
    }

    #[test]
    fn script_is_embedded() {
        assert!(FILE_DIR_OPS.starts_with("#!/bin/bash"));
        for command in ["create_deep_dirs_with_files", "create_files", "untar", "open_file_fd", "arequal", "stat"] {
            assert!(FILE_DIR_OPS.contains(&format!("    {command})")), "{command}");
        }
    }
}
