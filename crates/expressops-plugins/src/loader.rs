//! Dynamic loading of compiled plugin objects from disk.
//!
//! `gini_core::plugin_system::manager::DefaultPluginManager::load_so_plugin`
//! loads a `.so` through a hand-marshalled C-ABI vtable because its plugins
//! may be compiled by a different toolchain than the host. Every plugin
//! here is a first-party `cdylib` built from the same workspace, so the
//! loader trampolines straight to a boxed `dyn Plugin` instead of crossing
//! a C ABI: [`declare_plugin!`] exports a single `extern "C"` constructor
//! that hands back a `Box<dyn Plugin>`, and [`DynamicLoader::load`] turns
//! that into an `Arc<dyn Plugin>` kept alive alongside its `Library`.

use std::path::Path;
use std::sync::Arc;

use expressops_core::plugin::SharedPlugin;
use expressops_core::Plugin;
use libloading::{Library, Symbol};
use thiserror::Error;

pub const PLUGIN_CONSTRUCTOR_SYMBOL: &[u8] = b"_expressops_plugin_create\0";

#[derive(Debug, Error)]
pub enum PluginLoadError {
    #[error("failed to load plugin library at {path}: {source}")]
    Library { path: String, source: libloading::Error },

    #[error("plugin library at {path} has no `_expressops_plugin_create` symbol: {source}")]
    MissingSymbol { path: String, source: libloading::Error },

    #[error("plugin constructor at {path} returned a null pointer")]
    NullConstructor { path: String },
}

/// The constructor every plugin `cdylib` exports.
type PluginConstructor = unsafe extern "C" fn() -> *mut dyn Plugin;

/// A plugin loaded from a dynamic library, with the library kept resident
/// for as long as the plugin instance is reachable. Field order matters:
/// `plugin` must drop before `_library`, since the plugin's vtable and
/// code live inside the mapped library.
pub struct LoadedPlugin {
    plugin: SharedPlugin,
    _library: Library,
}

impl LoadedPlugin {
    pub fn plugin(&self) -> SharedPlugin {
        self.plugin.clone()
    }
}

pub struct DynamicLoader;

impl DynamicLoader {
    /// Loads the plugin `cdylib` at `path`.
    ///
    /// # Safety
    /// Calls into the target library's exported constructor. The caller
    /// must trust that `path` names a `cdylib` built against this same
    /// `expressops-core` (same `Plugin` vtable layout); loading an
    /// unrelated library is undefined behavior.
    pub unsafe fn load(path: &Path) -> Result<LoadedPlugin, PluginLoadError> {
        let path_str = path.display().to_string();
        let library = unsafe { Library::new(path) }
            .map_err(|source| PluginLoadError::Library { path: path_str.clone(), source })?;

        let constructor: Symbol<PluginConstructor> = unsafe { library.get(PLUGIN_CONSTRUCTOR_SYMBOL) }
            .map_err(|source| PluginLoadError::MissingSymbol { path: path_str.clone(), source })?;

        let raw = unsafe { constructor() };
        if raw.is_null() {
            return Err(PluginLoadError::NullConstructor { path: path_str });
        }
        let plugin: Box<dyn Plugin> = unsafe { Box::from_raw(raw) };
        Ok(LoadedPlugin { plugin: Arc::from(plugin), _library: library })
    }
}

/// Exports a plugin's constructor under the symbol [`DynamicLoader`]
/// expects. Place at the crate root of a plugin `cdylib`:
///
/// ```ignore
/// expressops_plugins::declare_plugin!(MyPlugin, MyPlugin::default);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($plugin_type:ty, $constructor:path) => {
        #[no_mangle]
        pub extern "C" fn _expressops_plugin_create() -> *mut dyn ::expressops_core::Plugin {
            let constructor: fn() -> $plugin_type = $constructor;
            let instance: $plugin_type = constructor();
            Box::into_raw(Box::new(instance))
        }
    };
}
