pub mod analytics_service;
pub mod assignment_service;
pub mod device_monitor;
pub mod device_registry;
pub mod media_service;
pub mod playlist_service;
