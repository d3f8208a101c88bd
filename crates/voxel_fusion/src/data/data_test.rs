use super::*;

fn occ(occupancy: f32, weight: f32, observed: bool) -> OccupancyData {
  Data {
    field: Occupancy {
      occupancy,
      weight,
      observed,
    },
    ..Default::default()
  }
}

// =========================================================================
// Field updates
// =========================================================================

/// First update marks the voxel observed and reports it once.
#[test]
fn test_occupancy_update_reports_first_observation() {
  let mut field = Occupancy::default();
  assert!(!field.is_valid());

  assert!(field.update(-5.0, 20.0));
  assert!(field.is_valid());
  assert!(field.observed);
  assert_eq!(field.occupancy, -5.0);
  assert_eq!(field.weight, 1.0);

  assert!(!field.update(-3.0, 20.0));
  assert_eq!(field.occupancy, -4.0);
  assert_eq!(field.weight, 2.0);
}

/// Weight saturates at the configured maximum.
#[test]
fn test_occupancy_weight_saturates() {
  let mut field = Occupancy::default();
  for _ in 0..50 {
    field.update(-5.015, 20.0);
  }
  assert_eq!(field.weight, 20.0);
  assert!((field.field_value() - (-100.3)).abs() < 1e-3);
}

#[test]
fn test_tsdf_update_clamps_sample() {
  let mut field = Tsdf::default();
  assert!(!field.is_valid());
  assert!(field.update(3.0, 100.0));
  assert_eq!(field.tsdf, 1.0);
  assert!(!field.update(-1.0, 100.0));
  assert_eq!(field.tsdf, 0.0);
}

// =========================================================================
// Up-propagation
// =========================================================================

/// Mean skips invalid children and rounds the weight up.
#[test]
fn test_mean_of_valid_children() {
  let mut children = [OccupancyData::default(); 8];
  children[0] = occ(-2.0, 3.0, true);
  children[5] = occ(4.0, 2.0, true);

  let mean = mean_of(&children);
  assert_eq!(mean.field.occupancy, 1.0);
  assert_eq!(mean.field.weight, 3.0);
  assert!(!mean.field.observed);
}

/// Max picks the child with the largest occupancy * weight.
#[test]
fn test_max_of_uses_field_value() {
  let mut children = [occ(-1.0, 1.0, true); 8];
  children[3] = occ(0.5, 4.0, true);
  children[6] = occ(1.0, 1.0, true);

  let max = max_of(&children);
  assert_eq!(max.field.occupancy, 0.5);
  assert!(max.field.observed);

  let min = min_of(&children);
  assert_eq!(min.field.occupancy, -1.0);
}

/// A single unobserved child leaves the summary unobserved.
#[test]
fn test_summary_observed_requires_all_children() {
  let mut children = [occ(-1.0, 1.0, true); 8];
  children[2].field.observed = false;
  assert!(!max_of(&children).field.observed);

  // Fewer than eight children never count as observed.
  assert!(!max_of(&children[..4]).field.observed);
}

#[test]
fn test_colour_follows_valid_children() {
  let mut children = [OccupancyColourData::default(); 8];
  children[1].field = Occupancy {
    occupancy: 1.0,
    weight: 1.0,
    observed: true,
  };
  children[1].colour = Rgb {
    rgb: [200, 100, 50],
    weight: 1,
  };
  // Invalid child colour must not leak into the mean.
  children[2].colour = Rgb {
    rgb: [0, 0, 0],
    weight: 5,
  };

  let mean = mean_of(&children);
  assert_eq!(mean.colour.rgb, [200, 100, 50]);
}

#[test]
fn test_semantic_id_ignores_no_id() {
  let mut id = SemanticId::default();
  assert_eq!(id.get(), None);
  id.update(7);
  id.update(SemanticId::NO_ID);
  assert_eq!(id.get(), Some(7));
}
