//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter          | Implements                      | Connects to              |
//! |------------------|---------------------------------|--------------------------|
//! | `config_file`    | ConfigSource                    | JSON / postcard file     |
//! | `detection_feed` | (feeds DetectionPort)           | Detector / console       |
//! | `hardware`       | MotionPort, SuppressionPort,    | Simulated scene          |
//! |                  | DetectionPort, TimePort, DelayNs|                          |
//! | `log_sink`       | EventSink                       | Log output               |
//! | `messaging`      | MessagingPort                   | Log output (SMS stand-in)|
//! | `time`           | TimePort, DelayNs               | `std::time::Instant`     |

pub mod config_file;
pub mod detection_feed;
pub mod hardware;
pub mod log_sink;
pub mod messaging;
pub mod time;
