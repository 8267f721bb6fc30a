use crate::types::site::LatLon;
use haversine::{distance, Location as HaversineLocation, Units};
use ordered_float::OrderedFloat;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use std::collections::HashMap;

/// One point of a dataset's lat/lon grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub lat_index: usize,
    pub lon_index: usize,
    pub latitude: f64,
    pub longitude: f64,
}

impl RTreeObject for GridCell {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.latitude, self.longitude])
    }
}

impl PointDistance for GridCell {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let d_lat = self.latitude - point[0];
        let d_lon = self.longitude - point[1];
        d_lat * d_lat + d_lon * d_lon
    }
}

/// The grid cell chosen for a site and how far away it is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMatch {
    pub cell: GridCell,
    pub distance_km: f64,
}

/// Sites snapped to cells, with duplicate cells read only once.
#[derive(Debug, Clone)]
pub struct SiteCells {
    /// Distinct cells, in order of first use.
    pub cells: Vec<CellMatch>,
    /// For each input site, the index into `cells`.
    pub site_to_cell: Vec<usize>,
    /// Distance from each input site to its cell.
    pub distances_km: Vec<f64>,
}

fn haversine_km(site: LatLon, cell: &GridCell) -> f64 {
    distance(
        HaversineLocation {
            latitude: site.0,
            longitude: site.1,
        },
        HaversineLocation {
            latitude: cell.latitude,
            longitude: cell.longitude,
        },
        Units::Kilometers,
    )
}

/// Nearest-cell lookup over a regular lat/lon grid.
#[derive(Debug, Clone)]
pub struct GridLocator {
    rtree: RTree<GridCell>,
}

impl GridLocator {
    pub fn new(lat: &[f64], lon: &[f64]) -> Self {
        let cells = lat
            .iter()
            .enumerate()
            .flat_map(|(i, la)| {
                lon.iter().enumerate().map(move |(j, lo)| GridCell {
                    lat_index: i,
                    lon_index: j,
                    latitude: *la,
                    longitude: *lo,
                })
            })
            .collect();
        Self {
            rtree: RTree::bulk_load(cells),
        }
    }

    pub fn len(&self) -> usize {
        self.rtree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.rtree.size() == 0
    }

    /// Closest cell to `site` by great-circle distance, `None` for an empty grid.
    ///
    /// The tree is searched with the site's longitude shifted by ±360° as
    /// well, so a site near the antimeridian can snap to a cell on the other side.
    pub fn locate(&self, site: LatLon) -> Option<CellMatch> {
        let mut best: Option<CellMatch> = None;
        for shift in [0.0, -360.0, 360.0] {
            let Some(cell) = self.rtree.nearest_neighbor(&[site.0, site.1 + shift]) else {
                continue;
            };
            let distance_km = haversine_km(site, cell);
            if best.as_ref().map_or(true, |b| distance_km < b.distance_km) {
                best = Some(CellMatch {
                    cell: *cell,
                    distance_km,
                });
            }
        }
        best
    }

    /// Snaps every site; sites sharing a location are looked up once and
    /// sites falling in the same cell share one entry.
    pub fn locate_all(&self, sites: &[LatLon]) -> Option<SiteCells> {
        let mut by_location: HashMap<(OrderedFloat<f64>, OrderedFloat<f64>), CellMatch> = HashMap::new();
        let mut by_cell: HashMap<(usize, usize), usize> = HashMap::new();
        let mut cells = Vec::new();
        let mut site_to_cell = Vec::with_capacity(sites.len());
        let mut distances_km = Vec::with_capacity(sites.len());

        for site in sites {
            let location = (OrderedFloat(site.0), OrderedFloat(site.1));
            let found = match by_location.get(&location) {
                Some(found) => *found,
                None => {
                    let found = self.locate(*site)?;
                    by_location.insert(location, found);
                    found
                }
            };
            let index = *by_cell
                .entry((found.cell.lat_index, found.cell.lon_index))
                .or_insert_with(|| {
                    cells.push(found);
                    cells.len() - 1
                });
            site_to_cell.push(index);
            distances_km.push(found.distance_km);
        }

        Some(SiteCells {
            cells,
            site_to_cell,
            distances_km,
        })
    }
}
