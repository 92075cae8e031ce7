//! In-memory container engine for tests
//!
//! Containers are plain records. Each container owns a tiny file tree that is
//! shared with every container created with `volumes_from` it, which is enough
//! to exercise data-volume handling, and `exec` understands a handful of
//! commands (`ls`, `cat`, `echo`, `true`, `false`).

use crate::engine::{ContainerEngine, LogStream};
use crate::error::{Error, Result};
use crate::types::{
    ContainerInfo, ContainerSpec, ContainerStatus, ExecOutput, LogOptions, Mount, RemoveOptions,
    Tail,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

type FileTree = Arc<RwLock<BTreeMap<String, Vec<u8>>>>;

struct MemoryContainer {
    id: String,
    spec: ContainerSpec,
    status: ContainerStatus,
    files: FileTree,
    logs: Vec<String>,
}

/// In-memory engine
#[derive(Default)]
pub struct MemoryEngine {
    containers: RwLock<HashMap<String, MemoryContainer>>,
    failing_creates: RwLock<BTreeSet<String>>,
    next_id: AtomicU64,
}

impl MemoryEngine {
    /// Create an empty engine
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, MemoryContainer>> {
        self.containers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, MemoryContainer>> {
        self.containers.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn missing(name: &str) -> Error {
        Error::NoSuchContainer {
            name: name.to_string(),
        }
    }

    /// Names of every container, sorted
    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Make every future `create` of `name` fail
    pub fn fail_create(&self, name: impl Into<String>) {
        self.failing_creates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into());
    }

    /// Append a line to a container's log
    pub fn push_log(&self, name: &str, line: impl Into<String>) -> Result<()> {
        let mut containers = self.write();
        let container = containers.get_mut(name).ok_or_else(|| Self::missing(name))?;
        container.logs.push(line.into());
        Ok(())
    }

    /// Read a file visible inside a container
    pub fn read_file(&self, name: &str, path: &str) -> Option<String> {
        let containers = self.read();
        let container = containers.get(name)?;
        let files = container.files.read().unwrap_or_else(PoisonError::into_inner);
        files
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Write a file visible inside a container
    pub fn write_file(&self, name: &str, path: &str, contents: impl Into<Vec<u8>>) -> Result<()> {
        let containers = self.read();
        let container = containers.get(name).ok_or_else(|| Self::missing(name))?;
        container
            .files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), contents.into());
        Ok(())
    }

    fn run(files: &BTreeMap<String, Vec<u8>>, args: &[String]) -> ExecOutput {
        let Some((program, rest)) = args.split_first() else {
            return ExecOutput {
                code: Some(126),
                output: "no command given\n".to_string(),
            };
        };

        match program.as_str() {
            "true" => ExecOutput {
                code: Some(0),
                output: String::new(),
            },
            "false" => ExecOutput {
                code: Some(1),
                output: String::new(),
            },
            "echo" => ExecOutput {
                code: Some(0),
                output: format!("{}\n", rest.join(" ")),
            },
            "cat" => {
                let mut output = String::new();
                for path in rest {
                    match files.get(path.as_str()) {
                        Some(bytes) => output.push_str(&String::from_utf8_lossy(bytes)),
                        None => {
                            return ExecOutput {
                                code: Some(1),
                                output: format!("cat: {}: No such file or directory\n", path),
                            };
                        }
                    }
                }
                ExecOutput {
                    code: Some(0),
                    output,
                }
            }
            "ls" => {
                let dir = rest.first().map(String::as_str).unwrap_or("/");
                list_dir(files, dir)
            }
            other => ExecOutput {
                code: Some(127),
                output: format!(
                    "exec: \"{}\": executable file not found in $PATH\n",
                    other
                ),
            },
        }
    }
}

fn list_dir(files: &BTreeMap<String, Vec<u8>>, dir: &str) -> ExecOutput {
    let trimmed = dir.trim_end_matches('/');
    if files.contains_key(trimmed) {
        return ExecOutput {
            code: Some(0),
            output: format!("{}\n", trimmed),
        };
    }

    let prefix = format!("{}/", trimmed);
    let entries: BTreeSet<&str> = files
        .keys()
        .filter_map(|path| path.strip_prefix(prefix.as_str()))
        .filter_map(|rest| rest.split('/').next())
        .filter(|entry| !entry.is_empty())
        .collect();

    if entries.is_empty() {
        return ExecOutput {
            code: Some(2),
            output: format!("ls: cannot access '{}': No such file or directory\n", dir),
        };
    }

    let mut output = entries.into_iter().collect::<Vec<_>>().join("\n");
    output.push('\n');
    ExecOutput {
        code: Some(0),
        output,
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<(String, Vec<u8>)>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else {
            let relative = path
                .strip_prefix(root)
                .map_err(|e| Error::spawn_failed(e.to_string()))?
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.push((relative, std::fs::read(&path)?));
        }
    }
    Ok(())
}

#[async_trait]
impl ContainerEngine for MemoryEngine {
    async fn status(&self, name: &str) -> Result<ContainerStatus> {
        Ok(self
            .read()
            .get(name)
            .map(|c| c.status)
            .unwrap_or(ContainerStatus::Absent))
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<()> {
        if self
            .failing_creates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&spec.name)
        {
            return Err(Error::CommandFailed {
                command: format!("create {}", spec.name),
                code: Some(125),
                output: "injected failure".to_string(),
            });
        }

        let mut containers = self.write();
        if containers.contains_key(&spec.name) {
            return Err(Error::NameConflict {
                name: spec.name.clone(),
            });
        }

        let files = match &spec.volumes_from {
            Some(source) => containers
                .get(source)
                .map(|c| c.files.clone())
                .ok_or_else(|| Self::missing(source))?,
            None => FileTree::default(),
        };

        let id = format!("{:012x}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        containers.insert(
            spec.name.clone(),
            MemoryContainer {
                id,
                spec: spec.clone(),
                status: ContainerStatus::Created,
                files,
                logs: Vec::new(),
            },
        );
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        let mut containers = self.write();
        let container = containers.get_mut(name).ok_or_else(|| Self::missing(name))?;
        if !container.status.is_running() {
            container.status = ContainerStatus::Running;
            let line = format!("starting {}", container.spec.image);
            container.logs.push(line);
        }
        Ok(())
    }

    async fn stop(&self, name: &str, _timeout: Duration) -> Result<()> {
        let mut containers = self.write();
        let container = containers.get_mut(name).ok_or_else(|| Self::missing(name))?;
        if container.status.is_running() {
            container.status = ContainerStatus::Exited;
            container.logs.push("stopped".to_string());
        }
        Ok(())
    }

    async fn kill(&self, name: &str) -> Result<()> {
        let mut containers = self.write();
        let container = containers.get_mut(name).ok_or_else(|| Self::missing(name))?;
        if !container.status.is_running() {
            return Err(Error::NotRunning {
                name: name.to_string(),
            });
        }
        container.status = ContainerStatus::Exited;
        container.logs.push("killed".to_string());
        Ok(())
    }

    async fn remove(&self, name: &str, options: RemoveOptions) -> Result<()> {
        let mut containers = self.write();
        let container = containers.get(name).ok_or_else(|| Self::missing(name))?;
        if container.status.is_running() && !options.force {
            return Err(Error::CommandFailed {
                command: format!("rm {}", name),
                code: Some(1),
                output: format!("You cannot remove a running container {}", name),
            });
        }
        containers.remove(name);
        Ok(())
    }

    async fn exec(&self, name: &str, args: &[String]) -> Result<ExecOutput> {
        let containers = self.read();
        let container = containers.get(name).ok_or_else(|| Self::missing(name))?;
        if !container.status.is_running() {
            return Err(Error::NotRunning {
                name: name.to_string(),
            });
        }
        let files = container.files.read().unwrap_or_else(PoisonError::into_inner);
        Ok(Self::run(&files, args))
    }

    async fn logs(&self, name: &str, options: &LogOptions) -> Result<LogStream> {
        let containers = self.read();
        let container = containers.get(name).ok_or_else(|| Self::missing(name))?;
        let lines = match options.tail {
            Tail::All => container.logs.clone(),
            Tail::Lines(n) => {
                let skip = container.logs.len().saturating_sub(n);
                container.logs[skip..].to_vec()
            }
        };
        // Nothing new ever arrives, so following ends with the history.
        Ok(stream::iter(lines.into_iter().map(Ok)).boxed())
    }

    async fn inspect(&self, name: &str) -> Result<ContainerInfo> {
        let containers = self.read();
        let container = containers.get(name).ok_or_else(|| Self::missing(name))?;
        let spec = &container.spec;

        let mut mounts: Vec<Mount> = spec
            .volumes
            .iter()
            .map(|destination| Mount {
                source: format!("{}-volume", container.id),
                destination: destination.clone(),
            })
            .collect();
        if let Some(source) = spec.volumes_from.as_ref().and_then(|s| containers.get(s)) {
            mounts.extend(source.spec.volumes.iter().map(|destination| Mount {
                source: format!("{}-volume", source.id),
                destination: destination.clone(),
            }));
        }

        Ok(ContainerInfo {
            id: container.id.clone(),
            name: spec.name.clone(),
            image: spec.image.clone(),
            status: container.status,
            mounts,
            links: spec.links.clone(),
            volumes_from: spec.volumes_from.iter().cloned().collect(),
            labels: spec.labels.clone(),
        })
    }

    async fn copy_into(&self, name: &str, source: &Path, destination: &str) -> Result<()> {
        let mut collected = Vec::new();
        collect_files(source, source, &mut collected)?;

        let containers = self.read();
        let container = containers.get(name).ok_or_else(|| Self::missing(name))?;
        let mut files = container.files.write().unwrap_or_else(PoisonError::into_inner);
        let base = destination.trim_end_matches('/');
        for (relative, contents) in collected {
            files.insert(format!("{}/{}", base, relative), contents);
        }
        Ok(())
    }
}
