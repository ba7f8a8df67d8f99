//! Instrument asset loading

use crate::config::ClientConfig;
use crate::render::{RenderError, Renderer};
use crate::types::{Resource, ResourceKind, ResourceManifest};
use futures::future::try_join_all;

/// Load every resource of `manifest` concurrently
///
/// Scripts whose path the renderer already has are skipped. Script loads are
/// awaited, stylesheets are injected and count as loaded immediately.
///
/// # Errors
/// The first script that fails to load
pub async fn load_resources(
    renderer: &dyn Renderer,
    manifest: &ResourceManifest,
) -> Result<(), RenderError> {
    let loads = manifest
        .iter()
        .map(|(name, resource)| load_resource(renderer, name, resource));

    try_join_all(loads).await?;
    Ok(())
}

async fn load_resource(
    renderer: &dyn Renderer,
    name: &str,
    resource: &Resource,
) -> Result<(), RenderError> {
    match resource.kind {
        ResourceKind::Js if renderer.has_script(&resource.path) => {
            tracing::debug!(resource = name, path = %resource.path, "script already present");
            Ok(())
        }
        ResourceKind::Js => {
            tracing::debug!(resource = name, path = %resource.path, "loading script");
            renderer.load_script(resource).await
        }
        ResourceKind::Css => {
            tracing::debug!(resource = name, path = %resource.path, "injecting stylesheet");
            renderer.inject_stylesheet(resource);
            Ok(())
        }
    }
}

/// Run the init function of every script that declares one, in manifest order
///
/// Returns how many functions the renderer actually ran.
pub fn run_resource_functions(
    renderer: &dyn Renderer,
    manifest: &ResourceManifest,
    config: &ClientConfig,
) -> usize {
    let mut ran = 0;
    for (name, resource) in manifest {
        let Some(func) = resource.func.as_deref() else {
            continue;
        };
        if resource.kind != ResourceKind::Js {
            continue;
        }
        if renderer.run_init(func, config) {
            ran += 1;
        } else {
            tracing::debug!(resource = name, func, "init function not available");
        }
    }
    ran
}
