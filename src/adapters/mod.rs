//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter         | Implements         | Connects to              |
//! |-----------------|--------------------|--------------------------|
//! | `hardware`      | SensorPort         | RTD ADC channel          |
//! |                 | ActuatorPort       | Relay bank (GPIO)        |
//! | `log_sink`      | EventSink          | Serial log output        |
//! | `nvs`           | SettingsStore      | NVS / in-memory store    |
//! |                 | ResumeStore        |                          |
//! | `program_store` | ProgramStore       | JSON program set         |
//! | `time`          | ClockPort          | ESP32 system timer, RTC  |

pub mod hardware;
pub mod log_sink;
pub mod nvs;
pub mod program_store;
pub mod time;
