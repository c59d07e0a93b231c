//! Ports: engine が外界と話すための trait 群。
//!
//! - **Clock**: 現在時刻
//! - **IdGenerator**: InstanceId / LeaseToken の発行
//! - **RunStore**: TaskRun の永続化と lease の原子的な取得
//! - **Reporter**: 実行結果の sink

pub mod clock;
pub mod id_generator;
pub mod reporter;
pub mod run_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use id_generator::{IdGenerator, UlidGenerator};
pub use reporter::Reporter;
pub use run_store::{RunStore, StoreError};
