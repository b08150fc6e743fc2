pub mod csv_file;
pub mod publish;

pub use csv_file::{flatten_record, write_anomaly_csv, write_report_csv};
pub use publish::{
    ConfiguredPublisher, DirectoryPublisher, HttpPublisher, PublishError, PublishReceipt, Publisher,
};
