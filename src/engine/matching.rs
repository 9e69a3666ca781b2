use crate::error::AppError;
use crate::geo::{ensure_finite, haversine_km};
use crate::models::mechanic::{GeoPoint, IssueType};
use crate::models::request::{CandidateMatch, CandidateStatus};
use crate::state::AppState;

/// Ranks mechanics around `origin` for one breakdown: ascending distance,
/// ties by rating descending, then by id so equal shops page stably.
/// `fallback` widens the radius and drops the specialty filter; it is only
/// set by the escalation rescan.
pub fn find_candidates(
    state: &AppState,
    origin: &GeoPoint,
    issue_type: IssueType,
    offset: usize,
    limit: Option<usize>,
    fallback: bool,
) -> Result<Vec<CandidateMatch>, AppError> {
    ensure_finite(origin)?;

    let radius_km = if fallback {
        state.config.search_radius_km * state.config.fallback_radius_factor
    } else {
        state.config.search_radius_km
    };
    let limit = limit.unwrap_or(state.config.page_limit);

    let mut ranked: Vec<CandidateMatch> = state
        .mechanics
        .iter()
        .filter_map(|entry| {
            let mechanic = entry.value();
            if !fallback && !mechanic.services(issue_type) {
                return None;
            }

            let distance_km = haversine_km(origin, &mechanic.location);
            if distance_km > radius_km {
                return None;
            }

            Some(CandidateMatch {
                mechanic_id: mechanic.id,
                mechanic_name: mechanic.name.clone(),
                distance_km,
                rating: mechanic.rating,
                status: CandidateStatus::Pending,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then(b.rating.total_cmp(&a.rating))
            .then(a.mechanic_id.cmp(&b.mechanic_id))
    });

    Ok(ranked.into_iter().skip(offset).take(limit).collect())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::find_candidates;
    use crate::config::Config;
    use crate::models::mechanic::{GeoPoint, IssueType, Mechanic};
    use crate::state::AppState;

    const ORIGIN: GeoPoint = GeoPoint {
        lat: 22.99,
        lng: 72.49,
    };

    fn shop(state: &AppState, id_seed: u128, name: &str, lat: f64, lng: f64, rating: f64) {
        shop_with_specialties(state, id_seed, name, lat, lng, rating, vec![]);
    }

    fn shop_with_specialties(
        state: &AppState,
        id_seed: u128,
        name: &str,
        lat: f64,
        lng: f64,
        rating: f64,
        specialties: Vec<IssueType>,
    ) {
        let mechanic = Mechanic {
            id: Uuid::from_u128(id_seed),
            name: name.to_string(),
            phone: "9800000000".to_string(),
            location: GeoPoint { lat, lng },
            rating,
            specialties,
            registered_at: Utc::now(),
        };
        state.mechanics.insert(mechanic.id, mechanic);
    }

    #[test]
    fn orders_by_ascending_distance() {
        let state = AppState::new(Config::default());
        shop(&state, 1, "far", 23.05, 72.49, 4.0);
        shop(&state, 2, "near", 22.991, 72.491, 4.0);
        shop(&state, 3, "mid", 23.01, 72.49, 4.0);

        let found = find_candidates(&state, &ORIGIN, IssueType::Battery, 0, None, false).unwrap();

        let names: Vec<&str> = found.iter().map(|c| c.mechanic_name.as_str()).collect();
        assert_eq!(names, ["near", "mid", "far"]);
        assert!(found[0].distance_km <= found[1].distance_km);
        assert!(found[1].distance_km <= found[2].distance_km);
    }

    #[test]
    fn distance_ties_break_on_rating_then_id() {
        let state = AppState::new(Config::default());
        shop(&state, 7, "low-rated", 22.991, 72.491, 3.0);
        shop(&state, 5, "high-rated", 22.991, 72.491, 4.9);
        shop(&state, 2, "also-high", 22.991, 72.491, 4.9);

        let found = find_candidates(&state, &ORIGIN, IssueType::Battery, 0, None, false).unwrap();

        let names: Vec<&str> = found.iter().map(|c| c.mechanic_name.as_str()).collect();
        assert_eq!(names, ["also-high", "high-rated", "low-rated"]);
    }

    #[test]
    fn paginates_with_offset_and_limit() {
        let state = AppState::new(Config::default());
        for seed in 1..=8u128 {
            shop(
                &state,
                seed,
                &format!("shop-{seed}"),
                22.99 + seed as f64 * 0.001,
                72.49,
                4.0,
            );
        }

        let first = find_candidates(&state, &ORIGIN, IssueType::Tyre, 0, None, false).unwrap();
        assert_eq!(first.len(), 5);

        let rest = find_candidates(&state, &ORIGIN, IssueType::Tyre, 5, None, false).unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0].mechanic_name, "shop-6");
    }

    #[test]
    fn out_of_radius_pool_yields_empty_list() {
        let state = AppState::new(Config::default());
        shop(&state, 1, "another-city", 19.07, 72.87, 4.8);

        let found = find_candidates(&state, &ORIGIN, IssueType::Engine, 0, None, false).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn specialty_filter_is_relaxed_on_fallback() {
        let state = AppState::new(Config::default());
        shop_with_specialties(
            &state,
            1,
            "tyres-only",
            22.991,
            72.491,
            4.5,
            vec![IssueType::Tyre],
        );

        let strict = find_candidates(&state, &ORIGIN, IssueType::Battery, 0, None, false).unwrap();
        assert!(strict.is_empty());

        let widened = find_candidates(&state, &ORIGIN, IssueType::Battery, 0, None, true).unwrap();
        assert_eq!(widened.len(), 1);
    }

    #[test]
    fn fallback_widens_the_radius() {
        let state = AppState::new(Config::default());
        // ~36 km north: outside the 25 km default, inside the doubled radius.
        shop(&state, 1, "edge-of-town", 23.32, 72.49, 4.0);

        let strict = find_candidates(&state, &ORIGIN, IssueType::Towing, 0, None, false).unwrap();
        assert!(strict.is_empty());

        let widened = find_candidates(&state, &ORIGIN, IssueType::Towing, 0, None, true).unwrap();
        assert_eq!(widened.len(), 1);
    }

    #[test]
    fn non_finite_origin_is_invalid_location() {
        let state = AppState::new(Config::default());
        let origin = GeoPoint {
            lat: f64::NAN,
            lng: 72.49,
        };

        let err = find_candidates(&state, &origin, IssueType::Battery, 0, None, false).unwrap_err();
        assert!(matches!(err, crate::error::AppError::InvalidLocation(_)));
    }
}
