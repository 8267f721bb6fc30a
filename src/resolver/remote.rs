//! OPeNDAP URL and file-name construction for MERRA-2 granules.

use crate::resolver::grid::GridWindow;
use crate::types::bounding_box::BoundingBox;
use crate::types::collection::Collection;
use crate::types::date_range::DateRange;
use chrono::{Datelike, NaiveDate};

pub const OPENDAP_ROOT: &str = "https://goldsmr4.gesdisc.eosdis.nasa.gov/opendap";

/// The MERRA-2 production stream that produced data for `date`.
pub fn stream_code(collection: &Collection, date: NaiveDate) -> &'static str {
    if collection.is_invariant() {
        return "101";
    }
    match date.year() {
        y if y < 1992 => "100",
        y if y < 2001 => "200",
        y if y < 2011 => "300",
        _ => "400",
    }
}

pub fn remote_dir_url(collection: &Collection, date: NaiveDate) -> String {
    if collection.is_invariant() {
        format!("{}/MERRA2_MONTHLY/{}/1980", OPENDAP_ROOT, collection.esdt_dir)
    } else {
        format!(
            "{}/MERRA2/{}/{}",
            OPENDAP_ROOT,
            collection.esdt_dir,
            date.format("%Y/%m")
        )
    }
}

/// Granule file name without the query string, also used as the local raw file name.
pub fn remote_file_name(collection: &Collection, date: NaiveDate) -> String {
    let stream = stream_code(collection, date);
    if collection.is_invariant() {
        format!("MERRA2_{}.{}.00000000.nc4.nc4", stream, collection.collection)
    } else {
        format!(
            "MERRA2_{}.{}.{}.nc4.nc",
            stream,
            collection.collection,
            date.format("%Y%m%d")
        )
    }
}

/// OPeNDAP constraint expression selecting the collection's variables over `window`.
pub fn query_params(collection: &Collection, window: &GridWindow) -> String {
    let time = if collection.is_invariant() {
        "[0:0]"
    } else {
        "[0:23]"
    };
    let lat = format!("[{}:{}]", window.lat_start, window.lat_end);
    let lon = format!("[{}:{}]", window.lon_start, window.lon_end);

    let mut parts: Vec<String> = collection
        .variables
        .names()
        .into_iter()
        .map(|name| format!("{}{}{}{}", name, time, lat, lon))
        .collect();
    parts.push("time".to_string());
    parts.push(format!("lat{}", lat));
    parts.push(format!("lon{}", lon));
    parts.join(",")
}

pub fn remote_url(collection: &Collection, date: NaiveDate, window: &GridWindow) -> String {
    format!(
        "{}/{}?{}",
        remote_dir_url(collection, date),
        remote_file_name(collection, date),
        query_params(collection, window)
    )
}

/// Directory name for one logical request, stable across runs of the same request.
pub fn request_dir_name(range: &DateRange, collections: &[Collection], bbox: &BoundingBox) -> String {
    format!("{}_{}_{}", range, joined_short_names(collections), bbox)
}

/// Sorted, de-duplicated short names joined with `-`.
pub fn joined_short_names(collections: &[Collection]) -> String {
    let mut names: Vec<&str> = collections.iter().map(|c| c.short_name.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    names.join("-")
}
