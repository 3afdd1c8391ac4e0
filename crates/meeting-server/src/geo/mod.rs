//! IP geolocation.
//!
//! Wraps a memory-mapped IP-location database, opened once at startup.
//! Private and loopback ranges are answered without touching the database;
//! a missing database yields `Unavailable` so callers can fall back to the
//! default region.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use common::{Result, Status};
use maxminddb::geoip2;
use tracing::{info, warn};

/// Location attributes for an IP. Fields missing from the database record
/// stay empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoInfo {
    pub country: String,
    pub iso_code: String,
    pub region: String,
    pub city: String,
    pub timezone: String,
    pub latitude: f64,
    pub longitude: f64,
    pub is_private: bool,
}

/// Geolocation service over a memory-mapped database file.
pub struct GeoLocationService {
    reader: Option<maxminddb::Reader<maxminddb::Mmap>>,
}

impl GeoLocationService {
    /// Open the database at `db_path`. A missing or unreadable file leaves
    /// the service running in degraded mode (lookups return `Unavailable`).
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        let db_path = db_path.as_ref();
        let reader = match maxminddb::Reader::open_mmap(db_path) {
            Ok(reader) => {
                info!(target: "meeting.geo", path = %db_path.display(), "geo database opened");
                Some(reader)
            }
            Err(e) => {
                warn!(
                    target: "meeting.geo",
                    path = %db_path.display(),
                    error = %e,
                    "geo database unavailable"
                );
                None
            }
        };
        Self { reader }
    }

    /// Service with no database; every public lookup is `Unavailable`.
    pub fn disabled() -> Self {
        Self { reader: None }
    }

    pub fn available(&self) -> bool {
        self.reader.is_some()
    }

    /// Locate an IP.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty or unparsable input, `Unavailable`
    /// when the database is missing, `NotFound` when the address has no
    /// record.
    pub fn lookup(&self, ip: &str) -> Result<GeoInfo> {
        if ip.is_empty() {
            return Err(Status::invalid_argument("ip is empty"));
        }
        let address: IpAddr = ip
            .parse()
            .map_err(|_| Status::invalid_argument("invalid ip"))?;

        let private = match address {
            IpAddr::V4(v4) => is_private_ipv4(v4),
            IpAddr::V6(v6) => is_private_ipv6(v6),
        };
        if private {
            return Ok(GeoInfo {
                is_private: true,
                ..GeoInfo::default()
            });
        }

        let Some(reader) = self.reader.as_ref() else {
            return Err(Status::unavailable("geo database not available"));
        };

        let city: geoip2::City = reader.lookup(address).map_err(|e| match e {
            maxminddb::MaxMindDBError::AddressNotFoundError(_) => {
                Status::not_found("ip not found in database")
            }
            other => Status::unavailable(other.to_string()),
        })?;

        Ok(decode_city(&city))
    }
}

fn english_name(names: Option<&std::collections::BTreeMap<&str, &str>>) -> String {
    names
        .and_then(|names| names.get("en"))
        .map_or_else(String::new, |name| (*name).to_string())
}

fn decode_city(city: &geoip2::City) -> GeoInfo {
    let mut info = GeoInfo::default();

    if let Some(country) = city.country.as_ref() {
        info.iso_code = country.iso_code.unwrap_or_default().to_string();
        info.country = english_name(country.names.as_ref());
    }
    if let Some(subdivisions) = city.subdivisions.as_ref() {
        if let Some(subdivision) = subdivisions.first() {
            info.region = english_name(subdivision.names.as_ref());
        }
    }
    if let Some(record) = city.city.as_ref() {
        info.city = english_name(record.names.as_ref());
    }
    if let Some(location) = city.location.as_ref() {
        info.timezone = location.time_zone.unwrap_or_default().to_string();
        info.latitude = location.latitude.unwrap_or_default();
        info.longitude = location.longitude.unwrap_or_default();
    }
    info
}

fn is_private_ipv4(address: Ipv4Addr) -> bool {
    let [a, b, _, _] = address.octets();
    // 10/8, 172.16/12, 192.168/16, 127/8
    a == 10 || (a == 172 && (16..=31).contains(&b)) || (a == 192 && b == 168) || a == 127
}

fn is_private_ipv6(address: Ipv6Addr) -> bool {
    let octets = address.octets();
    // ::1
    if address == Ipv6Addr::LOCALHOST {
        return true;
    }
    // fe80::/10 link-local, fc00::/7 unique-local
    (octets[0] == 0xfe && (octets[1] & 0xc0) == 0x80) || (octets[0] & 0xfe) == 0xfc
}
