use chrono::NaiveDateTime;
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{Device, NewDevice};
use crate::store::RuleStore;

const GENERATED_NAME_PREFIX: &str = "TV-";

/// `TV-` followed by the first eight characters of the device id.
pub fn generated_device_name(device_id: &str) -> String {
    let short: String = device_id.chars().take(8).collect();
    format!("{}{}", GENERATED_NAME_PREFIX, short)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckinOutcome {
    Registered,
    Refreshed,
}

/// Records a device poll. Known devices only get their check-in time,
/// liveness, address and reported app version refreshed; administrator
/// metadata is never touched.
pub fn checkin(
    store: &RuleStore,
    device_id: &str,
    address: Option<&str>,
    app_version: Option<&str>,
    now: NaiveDateTime,
) -> ServiceResult<CheckinOutcome> {
    if device_id.trim().is_empty() {
        return Err(ServiceError::validation("device_id is required"));
    }

    store.write_untracked(|conn| checkin_in(conn, device_id, address, app_version, now))
}

fn checkin_in(
    conn: &mut SqliteConnection,
    device_id: &str,
    address: Option<&str>,
    app_version: Option<&str>,
    now: NaiveDateTime,
) -> ServiceResult<CheckinOutcome> {
    use crate::schema::devices::dsl;

    let updated = diesel::update(dsl::devices.filter(dsl::device_id.eq(device_id)))
        .set((
            dsl::last_checkin.eq(Some(now)),
            dsl::is_active.eq(true),
            dsl::ip_address.eq(address),
        ))
        .execute(conn)?;

    if updated > 0 {
        if let Some(version) = app_version {
            diesel::update(dsl::devices.filter(dsl::device_id.eq(device_id)))
                .set(dsl::app_version.eq(version))
                .execute(conn)?;
        }
        return Ok(CheckinOutcome::Refreshed);
    }

    let new_device = NewDevice {
        device_id: device_id.to_string(),
        device_name: generated_device_name(device_id),
        last_checkin: Some(now),
        is_active: true,
        ip_address: address.map(str::to_string),
        app_version: app_version.map(str::to_string),
    };

    diesel::insert_into(dsl::devices)
        .values(&new_device)
        .execute(conn)?;

    tracing::info!(
        "Registered new device {} as {}",
        device_id,
        new_device.device_name
    );

    Ok(CheckinOutcome::Registered)
}

/// Ids of every device currently flagged live, ordered by id.
#[cfg(test)]
pub fn list_active(store: &RuleStore) -> ServiceResult<Vec<String>> {
    store.read(list_active_in)
}

pub(crate) fn list_active_in(conn: &mut SqliteConnection) -> ServiceResult<Vec<String>> {
    use crate::schema::devices::dsl;

    let ids = dsl::devices
        .filter(dsl::is_active.eq(true))
        .order(dsl::device_id.asc())
        .select(dsl::device_id)
        .load::<String>(conn)?;

    Ok(ids)
}

pub(crate) fn ensure_exists(conn: &mut SqliteConnection, device_id: &str) -> ServiceResult<()> {
    use crate::schema::devices::dsl;

    let found: Option<i32> = dsl::devices
        .filter(dsl::device_id.eq(device_id))
        .select(dsl::id)
        .first(conn)
        .optional()?;

    found
        .map(|_| ())
        .ok_or_else(|| ServiceError::not_found("Device", device_id))
}

#[cfg(test)]
pub fn get_device(store: &RuleStore, device_id: &str) -> ServiceResult<Device> {
    use crate::schema::devices::dsl;

    store.read(|conn| {
        dsl::devices
            .filter(dsl::device_id.eq(device_id))
            .select(Device::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| ServiceError::not_found("Device", device_id))
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceMetaUpdate {
    pub custom_name: Option<String>,
    pub location: Option<String>,
}

fn blank_to_null(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Administrator metadata. A field left out of the update keeps its value;
/// an empty string clears it.
pub fn update_meta(
    store: &RuleStore,
    device_id: &str,
    update: DeviceMetaUpdate,
) -> ServiceResult<Device> {
    use crate::schema::devices::dsl;

    let device = store.write_untracked(|conn| {
        ensure_exists(conn, device_id)?;

        if let Some(name) = update.custom_name {
            diesel::update(dsl::devices.filter(dsl::device_id.eq(device_id)))
                .set(dsl::custom_name.eq(blank_to_null(name)))
                .execute(conn)?;
        }
        if let Some(location) = update.location {
            diesel::update(dsl::devices.filter(dsl::device_id.eq(device_id)))
                .set(dsl::location.eq(blank_to_null(location)))
                .execute(conn)?;
        }

        Ok(dsl::devices
            .filter(dsl::device_id.eq(device_id))
            .select(Device::as_select())
            .first(conn)?)
    })?;

    tracing::info!(
        "Device {} updated: name={:?}, location={:?}",
        device_id,
        device.custom_name,
        device.location
    );

    Ok(device)
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    #[serde(flatten)]
    pub device: Device,
    pub display_name: String,
    pub content_count: i64,
}

/// Every known device, most recently seen first, with its active rule count.
pub fn list_devices(store: &RuleStore) -> ServiceResult<Vec<DeviceSummary>> {
    use crate::schema::device_content::dsl as dc;
    use crate::schema::devices::dsl;

    store.read(|conn| {
        let devices = dsl::devices
            .order((dsl::last_checkin.desc(), dsl::device_id.asc()))
            .select(Device::as_select())
            .load::<Device>(conn)?;

        let counts: HashMap<String, i64> = dc::device_content
            .filter(dc::is_active.eq(true))
            .group_by(dc::device_id)
            .select((dc::device_id, count_star()))
            .load::<(String, i64)>(conn)?
            .into_iter()
            .collect();

        Ok(devices
            .into_iter()
            .map(|device| DeviceSummary {
                display_name: device.display_name().to_string(),
                content_count: counts.get(&device.device_id).copied().unwrap_or(0),
                device,
            })
            .collect())
    })
}

pub fn count_active(store: &RuleStore) -> ServiceResult<i64> {
    use crate::schema::devices::dsl;

    store.read(|conn| {
        Ok(dsl::devices
            .filter(dsl::is_active.eq(true))
            .count()
            .get_result(conn)?)
    })
}

/// Flags devices whose last check-in is older than `threshold` as inactive.
pub fn mark_stale(store: &RuleStore, threshold: NaiveDateTime) -> ServiceResult<usize> {
    use crate::schema::devices::dsl;

    store.write_untracked(|conn| {
        Ok(diesel::update(
            dsl::devices
                .filter(dsl::is_active.eq(true))
                .filter(dsl::last_checkin.lt(threshold)),
        )
        .set(dsl::is_active.eq(false))
        .execute(conn)?)
    })
}

/// Inserts the spoof devices used for soak testing unless they already exist.
pub fn seed_test_devices(store: &RuleStore, now: NaiveDateTime) -> ServiceResult<usize> {
    use crate::schema::devices::dsl;

    const TEST_DEVICES: &[(&str, &str, &str)] = &[
        ("SPOOF001", "SPOOF-DEVICE-001", "192.168.1.201"),
        ("SPOOF002", "SPOOF-DEVICE-002", "192.168.1.202"),
    ];

    store.write_untracked(|conn| {
        let mut inserted = 0;
        for &(device_id, device_name, address) in TEST_DEVICES {
            let exists: i64 = dsl::devices
                .filter(dsl::device_id.eq(device_id))
                .count()
                .get_result(conn)?;
            if exists > 0 {
                continue;
            }

            diesel::insert_into(dsl::devices)
                .values(&NewDevice {
                    device_id: device_id.to_string(),
                    device_name: device_name.to_string(),
                    last_checkin: Some(now),
                    is_active: true,
                    ip_address: Some(address.to_string()),
                    app_version: Some("1.0".to_string()),
                })
                .execute(conn)?;
            inserted += 1;
        }
        Ok(inserted)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;
    use chrono::{Duration, Utc};

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    #[test]
    fn test_generated_name_uses_first_eight_chars() {
        assert_eq!(generated_device_name("abcdef123456"), "TV-abcdef12");
        assert_eq!(generated_device_name("abc"), "TV-abc");
        assert_eq!(generated_device_name("ééééééééé"), "TV-éééééééé");
    }

    #[test]
    fn test_first_checkin_registers_device() {
        let (store, _dir) = temp_store();

        let outcome = checkin(&store, "android-tv-0001", Some("10.0.0.5"), Some("2.1"), now())
            .unwrap();
        assert_eq!(outcome, CheckinOutcome::Registered);

        let device = get_device(&store, "android-tv-0001").unwrap();
        assert_eq!(device.device_name, "TV-android-");
        assert!(device.is_active);
        assert_eq!(device.ip_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(device.app_version.as_deref(), Some("2.1"));
        assert_eq!(device.custom_name, None);
        assert_eq!(device.location, None);
    }

    #[test]
    fn test_checkin_preserves_admin_metadata() {
        let (store, _dir) = temp_store();
        checkin(&store, "DEV1", Some("10.0.0.5"), None, now()).unwrap();

        update_meta(
            &store,
            "DEV1",
            DeviceMetaUpdate {
                custom_name: Some("Lobby".into()),
                location: Some("Ground floor".into()),
            },
        )
        .unwrap();

        let outcome = checkin(&store, "DEV1", Some("10.0.0.9"), Some("9.9"), now()).unwrap();
        assert_eq!(outcome, CheckinOutcome::Refreshed);

        let device = get_device(&store, "DEV1").unwrap();
        assert_eq!(device.custom_name.as_deref(), Some("Lobby"));
        assert_eq!(device.location.as_deref(), Some("Ground floor"));
        assert_eq!(device.ip_address.as_deref(), Some("10.0.0.9"));
        assert_eq!(device.app_version.as_deref(), Some("9.9"));
        assert_eq!(device.display_name(), "Lobby");
    }

    #[test]
    fn test_checkin_requires_device_id() {
        let (store, _dir) = temp_store();
        assert!(matches!(
            checkin(&store, "  ", None, None, now()),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn test_update_meta_unknown_device() {
        let (store, _dir) = temp_store();
        let err = update_meta(&store, "ghost", DeviceMetaUpdate::default()).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[test]
    fn test_update_meta_clears_with_empty_string() {
        let (store, _dir) = temp_store();
        checkin(&store, "DEV1", None, None, now()).unwrap();
        update_meta(
            &store,
            "DEV1",
            DeviceMetaUpdate {
                custom_name: Some("Lobby".into()),
                location: Some("Hall".into()),
            },
        )
        .unwrap();

        let device = update_meta(
            &store,
            "DEV1",
            DeviceMetaUpdate {
                custom_name: Some("".into()),
                location: None,
            },
        )
        .unwrap();

        assert_eq!(device.custom_name, None);
        assert_eq!(device.location.as_deref(), Some("Hall"));
        assert_eq!(device.display_name(), "TV-DEV1");
    }

    #[test]
    fn test_stale_devices_drop_out_of_active_list() {
        let (store, _dir) = temp_store();
        let long_ago = now() - Duration::hours(2);

        checkin(&store, "OLD", None, None, long_ago).unwrap();
        checkin(&store, "NEW", None, None, now()).unwrap();
        assert_eq!(list_active(&store).unwrap(), vec!["NEW", "OLD"]);

        let marked = mark_stale(&store, now() - Duration::minutes(5)).unwrap();
        assert_eq!(marked, 1);
        assert_eq!(list_active(&store).unwrap(), vec!["NEW"]);
        assert_eq!(count_active(&store).unwrap(), 1);

        // Polling again brings the device back.
        checkin(&store, "OLD", None, None, now()).unwrap();
        assert_eq!(list_active(&store).unwrap(), vec!["NEW", "OLD"]);
    }

    #[test]
    fn test_seed_test_devices_is_idempotent() {
        let (store, _dir) = temp_store();
        assert_eq!(seed_test_devices(&store, now()).unwrap(), 2);
        assert_eq!(seed_test_devices(&store, now()).unwrap(), 0);

        let devices = list_devices(&store).unwrap();
        assert_eq!(devices.len(), 2);
        assert!(devices.iter().all(|d| d.content_count == 0));
    }
}
