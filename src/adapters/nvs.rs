//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`SettingsStore`] and [`ResumeStore`] as postcard blobs
//! in the `breadmkr` namespace.
//!
//! - Settings are range-checked before persistence; out-of-range values
//!   are rejected, never clamped.
//! - The resume snapshot is written after run-state changes and once a
//!   minute while running, so a power cycle loses at most that much.
//! - ESP-IDF NVS commits are atomic per `nvs_commit()`.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::app::ports::{ResumeStore, SettingsError, SettingsStore};
use crate::config::SystemConfig;
use crate::fsm::context::ResumeSnapshot;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const NAMESPACE: &str = "breadmkr";
const SETTINGS_KEY: &str = "settings";
const RESUME_KEY: &str = "resume";

#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const MAX_BLOB_SIZE: usize = 4000;

pub struct NvsStore {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsStore {
    /// Create the adapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the partition is erased
    /// and re-initialised.
    pub fn new() -> Result<Self, SettingsError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(SettingsError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(SettingsError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(SettingsError::IoError);
            }
            info!("NvsStore: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsStore: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    fn load_blob<T: DeserializeOwned>(&self, key: &str) -> Result<T, SettingsError> {
        let bytes = self.read(key)?;
        postcard::from_bytes(&bytes).map_err(|_| SettingsError::Corrupted)
    }

    fn save_blob<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SettingsError> {
        let bytes = postcard::to_allocvec(value).map_err(|_| SettingsError::IoError)?;
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(SettingsError::StorageFull);
        }
        self.write(key, &bytes)?;
        info!("NvsStore: '{}' saved ({} bytes)", key, bytes.len());
        Ok(())
    }

    // ── Simulation backend ────────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(key: &str) -> String {
        format!("{}::{}", NAMESPACE, key)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read(&self, key: &str) -> Result<Vec<u8>, SettingsError> {
        self.store
            .borrow()
            .get(&Self::composite_key(key))
            .cloned()
            .ok_or(SettingsError::NotFound)
    }

    #[cfg(not(target_os = "espidf"))]
    fn write(&self, key: &str, data: &[u8]) -> Result<(), SettingsError> {
        self.store
            .borrow_mut()
            .insert(Self::composite_key(key), data.to_vec());
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn erase(&self, key: &str) -> Result<(), SettingsError> {
        self.store.borrow_mut().remove(&Self::composite_key(key));
        Ok(())
    }

    /// Overwrite a raw blob (tests exercise corrupted-storage handling).
    #[cfg(not(target_os = "espidf"))]
    pub fn put_raw(&self, key: &str, data: &[u8]) {
        self.store
            .borrow_mut()
            .insert(Self::composite_key(key), data.to_vec());
    }

    // ── ESP-IDF backend ───────────────────────────────────────

    /// Open the namespace, run `f` with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = c_name(NAMESPACE);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn read(&self, key: &str) -> Result<Vec<u8>, SettingsError> {
        let key_buf = c_name(key);
        let result = Self::with_nvs_handle(false, |handle| {
            let mut size: usize = 0;
            // First call: get size
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    core::ptr::null_mut(),
                    &mut size,
                )
            };
            if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                return Err(ret);
            }
            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    buf.as_mut_ptr() as *mut _,
                    &mut size,
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(buf)
        });
        match result {
            Ok(bytes) => Ok(bytes),
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(SettingsError::NotFound),
            Err(e) => {
                warn!("NvsStore: read of '{}' failed ({})", key, e);
                Err(SettingsError::IoError)
            }
        }
    }

    #[cfg(target_os = "espidf")]
    fn write(&self, key: &str, data: &[u8]) -> Result<(), SettingsError> {
        let key_buf = c_name(key);
        let result = Self::with_nvs_handle(true, |handle| {
            let ret = unsafe {
                nvs_set_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    data.as_ptr() as *const _,
                    data.len(),
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        result.map_err(|e| {
            warn!("NvsStore: write of '{}' failed ({})", key, e);
            if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                SettingsError::StorageFull
            } else {
                SettingsError::IoError
            }
        })
    }

    #[cfg(target_os = "espidf")]
    fn erase(&self, key: &str) -> Result<(), SettingsError> {
        let key_buf = c_name(key);
        let result = Self::with_nvs_handle(true, |handle| {
            let ret = unsafe { nvs_erase_key(handle, key_buf.as_ptr() as *const _) };
            if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        result.map_err(|_| SettingsError::IoError)
    }
}

/// NUL-terminated NVS name (15 characters max).
#[cfg(target_os = "espidf")]
fn c_name(name: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    let bytes = name.as_bytes();
    let len = bytes.len().min(15);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

impl SettingsStore for NvsStore {
    fn load(&self) -> Result<SystemConfig, SettingsError> {
        let config: SystemConfig = self.load_blob(SETTINGS_KEY)?;
        info!("NvsStore: settings loaded");
        Ok(config)
    }

    fn save(&self, config: &SystemConfig) -> Result<(), SettingsError> {
        config
            .validate()
            .map_err(|e| SettingsError::ValidationFailed(e.field_name()))?;
        self.save_blob(SETTINGS_KEY, config)
    }
}

impl ResumeStore for NvsStore {
    fn load_resume(&self) -> Result<Option<ResumeSnapshot>, SettingsError> {
        match self.load_blob(RESUME_KEY) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(SettingsError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save_resume(&self, snapshot: &ResumeSnapshot) -> Result<(), SettingsError> {
        self.save_blob(RESUME_KEY, snapshot)
    }

    fn clear_resume(&self) -> Result<(), SettingsError> {
        self.erase(RESUME_KEY)
    }
}
