pub mod meter;
pub mod reading;
pub mod report;

pub use meter::{Meter, MeterProperties, SiteInfo};
pub use reading::{numeric_value, DateWindow, Reading, ReadingsResponse, TemperatureSample};
pub use report::{AnomalyRecord, OutputRecord};
