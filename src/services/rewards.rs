use uuid::Uuid;

pub struct RewardService;

impl RewardService {
    /// Coins earned for `weight_kg` of collected waste, rounded to the
    /// nearest coin. Negative or non-finite input earns nothing.
    pub fn coins_for_weight(weight_kg: f64, coins_per_kg: f64) -> i64 {
        let coins = (weight_kg * coins_per_kg).round();
        if coins.is_finite() && coins > 0.0 {
            coins as i64
        } else {
            0
        }
    }

    /// Total price of an order, `None` on overflow.
    pub fn order_cost(unit_cost: i64, quantity: i64) -> Option<i64> {
        unit_cost.checked_mul(quantity)
    }

    /// Human-friendly order reference, e.g. `GC-1F3A9C07`.
    pub fn order_number() -> String {
        let id = Uuid::new_v4().simple().to_string();
        format!("GC-{}", id[..8].to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coins_round_to_nearest() {
        assert_eq!(RewardService::coins_for_weight(12.5, 10.0), 125);
        assert_eq!(RewardService::coins_for_weight(0.26, 10.0), 3);
        assert_eq!(RewardService::coins_for_weight(0.04, 10.0), 0);
        assert_eq!(RewardService::coins_for_weight(-3.0, 10.0), 0);
        assert_eq!(RewardService::coins_for_weight(f64::NAN, 10.0), 0);
    }

    #[test]
    fn order_cost_detects_overflow() {
        assert_eq!(RewardService::order_cost(150, 3), Some(450));
        assert_eq!(RewardService::order_cost(i64::MAX, 2), None);
    }

    #[test]
    fn order_numbers_are_prefixed_hex() {
        let number = RewardService::order_number();
        assert_eq!(number.len(), 11);
        assert!(number.starts_with("GC-"));
        assert!(number[3..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_ne!(number, RewardService::order_number());
    }
}
