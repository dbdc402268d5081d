use proptest::prelude::*;

use super::generators::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Every evaluation lies inside the computed bounds.
    #[test]
    fn eval_within_bounds(expr in arb_affine_expr(), (dims, symbols) in arb_point()) {
        let bounds = expr.bounds(&DIM_RANGES, &SYMBOL_RANGES);
        let value = expr.eval(&dims, &symbols);
        prop_assert!(bounds.contains(value), "{} = {} outside {}", expr, value, bounds);
    }

    /// Range-based simplification never changes the value inside the domain.
    #[test]
    fn simplify_preserves_value(expr in arb_affine_expr(), (dims, symbols) in arb_point()) {
        let simplified = expr.simplify(&DIM_RANGES, &SYMBOL_RANGES);
        prop_assert_eq!(expr.eval(&dims, &symbols), simplified.eval(&dims, &symbols), "{} vs {}", expr, simplified);
    }

    /// Substituting the identity for the dims is a no-op.
    #[test]
    fn replace_dims_identity(expr in arb_affine_expr(), (dims, symbols) in arb_point()) {
        let identity = [crate::AffineExpr::dim(0), crate::AffineExpr::dim(1)];
        prop_assert_eq!(expr.replace_dims(&identity).eval(&dims, &symbols), expr.eval(&dims, &symbols));
    }
}
