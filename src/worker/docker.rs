//! Docker-backed container runtime.
//!
//! One container per active session on a shared isolated network. The worker
//! image is built from the configured build context on first use; concurrent
//! cold-start sessions await the same in-flight build.

use std::collections::HashMap;

use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, InspectContainerOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::BuildImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::network::CreateNetworkOptions;
use bollard::Docker;
use futures_util::StreamExt;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::{WorkerAddressing, WorkerConfig};
use crate::worker::runtime::{
    worker_container_name, ContainerRuntime, WorkerHandle, WorkerSpec, PROFILE_MOUNT_PATH,
    WORKER_PORT,
};
use crate::{AppError, Result};

/// Shared-memory size for worker containers (2 GiB). Chromium crashes with
/// the Docker default of 64 MiB.
const SHM_SIZE_BYTES: i64 = 2 * 1024 * 1024 * 1024;

/// Grace period for container stop before the runtime force-kills.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Container runtime backed by the local Docker daemon.
pub struct DockerRuntime {
    docker: Docker,
    config: WorkerConfig,
    network_ready: OnceCell<()>,
    image_ready: OnceCell<()>,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Provision` if the daemon socket cannot be resolved.
    pub fn new(config: WorkerConfig) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|err| AppError::Provision(format!("docker connect failed: {err}")))?;
        Ok(Self {
            docker,
            config,
            network_ready: OnceCell::new(),
            image_ready: OnceCell::new(),
        })
    }

    /// Idempotent creation of the shared worker network.
    async fn ensure_network(&self) -> Result<()> {
        self.network_ready
            .get_or_try_init(|| async {
                let options = CreateNetworkOptions {
                    name: self.config.network_name.clone(),
                    driver: "bridge".to_owned(),
                    ..Default::default()
                };
                match self.docker.create_network(options).await {
                    Ok(_) => {
                        info!(network = %self.config.network_name, "worker network created");
                        Ok(())
                    }
                    // 409: the network already exists.
                    Err(bollard::errors::Error::DockerResponseServerError {
                        status_code: 409,
                        ..
                    }) => Ok(()),
                    Err(err) => Err(AppError::Provision(format!(
                        "failed to create worker network: {err}"
                    ))),
                }
            })
            .await
            .map(|()| ())
    }

    /// Ensure the worker image exists, building it from the configured build
    /// context when absent. The build runs at most once per process; all
    /// concurrent callers await the same completion.
    async fn ensure_image(&self) -> Result<()> {
        self.image_ready
            .get_or_try_init(|| async {
                if self.docker.inspect_image(&self.config.image).await.is_ok() {
                    debug!(image = %self.config.image, "worker image present");
                    return Ok(());
                }
                self.build_image().await
            })
            .await
            .map(|()| ())
    }

    async fn build_image(&self) -> Result<()> {
        info!(
            image = %self.config.image,
            context = %self.config.build_context.display(),
            "building worker image"
        );
        let context_dir = self.config.build_context.clone();
        let tarball = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let mut builder = tar::Builder::new(Vec::new());
            builder.append_dir_all(".", &context_dir)?;
            Ok(builder.into_inner()?)
        })
        .await
        .map_err(|err| AppError::Provision(format!("build-context task panicked: {err}")))??;

        let options = BuildImageOptions::<String> {
            dockerfile: "Dockerfile".to_owned(),
            t: self.config.image.clone(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(options, None, Some(tarball.into()));
        while let Some(msg) = stream.next().await {
            let info = msg
                .map_err(|err| AppError::Provision(format!("image build failed: {err}")))?;
            if let Some(err) = info.error {
                return Err(AppError::Provision(format!("image build failed: {err}")));
            }
            if let Some(line) = info.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    debug!(target: "image_build", "{line}");
                }
            }
        }
        info!(image = %self.config.image, "worker image built");
        Ok(())
    }

    async fn remove_stale(&self, name: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => debug!(container = name, "removed stale worker container"),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(err) => warn!(container = name, %err, "failed to remove stale container"),
        }
    }

    async fn published_port(&self, name: &str) -> Result<String> {
        let inspect = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .map_err(|err| AppError::Provision(format!("inspect failed: {err}")))?;
        let port_key = format!("{WORKER_PORT}/tcp");
        inspect
            .network_settings
            .and_then(|settings| settings.ports)
            .and_then(|ports| ports.get(&port_key).cloned().flatten())
            .and_then(|bindings| bindings.into_iter().next())
            .and_then(|binding: PortBinding| binding.host_port)
            .ok_or_else(|| {
                AppError::Provision(format!("no published port for container {name}"))
            })
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ensure_ready(&self) -> Result<()> {
        self.ensure_network().await
    }

    async fn start_worker(&self, spec: &WorkerSpec) -> Result<WorkerHandle> {
        self.ensure_network().await?;
        self.ensure_image().await?;

        let name = worker_container_name(&spec.session_id);
        self.remove_stale(&name).await;

        let port_key = format!("{WORKER_PORT}/tcp");
        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(port_key.clone(), HashMap::new());

        let port_bindings = match self.config.addressing {
            WorkerAddressing::Published => {
                let mut bindings = HashMap::new();
                bindings.insert(
                    port_key,
                    Some(vec![PortBinding {
                        host_ip: Some("127.0.0.1".to_owned()),
                        host_port: Some(String::new()),
                    }]),
                );
                Some(bindings)
            }
            WorkerAddressing::Internal => None,
        };

        let binds = spec.profile_mount.as_ref().map(|mount| {
            vec![format!(
                "{}:{PROFILE_MOUNT_PATH}",
                mount.to_string_lossy()
            )]
        });

        let host_config = HostConfig {
            binds,
            port_bindings,
            shm_size: Some(SHM_SIZE_BYTES),
            network_mode: Some(self.config.network_name.clone()),
            extra_hosts: Some(vec!["host.docker.internal:host-gateway".to_owned()]),
            ..Default::default()
        };

        let container_config = ContainerConfig {
            image: Some(self.config.image.clone()),
            env: Some(spec.env.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.clone(),
            platform: None,
        };
        self.docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|err| AppError::Provision(format!("container create failed: {err}")))?;

        self.docker
            .start_container(&name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|err| AppError::Provision(format!("container start failed: {err}")))?;

        let address = match self.config.addressing {
            WorkerAddressing::Published => {
                let host_port = self.published_port(&name).await?;
                format!("127.0.0.1:{host_port}")
            }
            WorkerAddressing::Internal => format!("{name}:{WORKER_PORT}"),
        };

        info!(session_id = %spec.session_id, container = %name, %address, "worker started");
        Ok(WorkerHandle { id: name, address })
    }

    async fn stop_worker(&self, worker_id: &str) {
        let options = StopContainerOptions {
            t: STOP_TIMEOUT_SECS,
        };
        if let Err(err) = self.docker.stop_container(worker_id, Some(options)).await {
            match err {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 304 | 404,
                    ..
                } => {}
                err => warn!(container = worker_id, %err, "failed to stop worker container"),
            }
        }
        self.remove_stale(worker_id).await;
    }

    async fn is_running(&self, worker_id: &str) -> bool {
        self.docker
            .inspect_container(worker_id, None::<InspectContainerOptions>)
            .await
            .ok()
            .and_then(|inspect| inspect.state)
            .and_then(|state| state.running)
            .unwrap_or(false)
    }
}
