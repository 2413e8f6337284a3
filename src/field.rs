use crate::integrator::OdeSystem;
use crate::params::ParameterSet;

/// Host and strain dynamics under logistic regulation.
///
/// State layout: index 0 holds uninfected hosts `x`, index `i + 1` holds the
/// hosts infected by the strain in slot `i`.
///
/// ```text
/// regul  = 1 - (x + sum(y)) / K
/// dx/dt  = (bx x + sum(external_i y_i)) regul - ux x - c x sum(transmission_i y_i)
/// dyi/dt = birth_i y_i regul - death_i y_i + c transmission_i x y_i
/// ```
pub struct DensityField<'a> {
    params: &'a ParameterSet,
}

impl<'a> DensityField<'a> {
    pub fn new(params: &'a ParameterSet) -> Self {
        Self { params }
    }
}

impl OdeSystem for DensityField<'_> {
    fn n_dim(&self) -> usize {
        self.params.n_vars()
    }

    fn derivative(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
        let host = self.params.host();
        let x = y[0];
        let strains = &y[1..];

        let total = x + strains.iter().sum::<f64>();
        let regul = 1.0 - total / host.carrying_capacity;

        let mut external_births = 0.0;
        let mut force = 0.0;
        for (i_slot, &density) in strains.iter().enumerate() {
            external_births += self.params.external()[i_slot] * density;
            force += self.params.transmission()[i_slot] * density;
        }

        dydt[0] = (host.birth_rate * x + external_births) * regul
            - host.death_rate * x
            - host.contact_rate * force * x;

        let infection = host.contact_rate * x;
        for (i_slot, &density) in strains.iter().enumerate() {
            dydt[i_slot + 1] = self.params.birth()[i_slot] * density * regul
                - self.params.death()[i_slot] * density
                + infection * self.params.transmission()[i_slot] * density;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::tests::host;

    fn params() -> ParameterSet {
        ParameterSet::new(
            host(),
            2,
            vec![0.5, 0.5],
            vec![0.3, 0.3],
            vec![0.4, 0.4],
            vec![0.2, 0.2],
        )
        .unwrap()
    }

    #[test]
    fn matches_hand_computed_derivative() {
        let params = params();
        let field = DensityField::new(&params);
        let mut dydt = vec![0.0; 3];
        field.derivative(0.0, &[10.0, 1.0, 0.0], &mut dydt);

        let regul = 1.0 - 11.0 / 80.0;
        let dx = (1.0 * 10.0 + 0.2 * 1.0) * regul - 0.2 * 10.0 - 1.0 * 0.4 * 1.0 * 10.0;
        let dy = 0.5 * regul - 0.3 + 1.0 * 0.4 * 10.0;
        assert!((dydt[0] - dx).abs() < 1e-12);
        assert!((dydt[1] - dy).abs() < 1e-12);
        assert_eq!(dydt[2], 0.0);
    }

    #[test]
    fn empty_population_is_stationary() {
        let params = params();
        let field = DensityField::new(&params);
        let mut dydt = vec![1.0; 3];
        field.derivative(0.0, &[0.0, 0.0, 0.0], &mut dydt);
        assert_eq!(dydt, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn host_grows_logistically_without_strains() {
        let params = params();
        let field = DensityField::new(&params);
        let mut dydt = vec![0.0; 3];

        // Disease-free equilibrium x* = K (1 - ux / bx).
        let x_eq = 80.0 * (1.0 - 0.2 / 1.0);
        field.derivative(0.0, &[x_eq, 0.0, 0.0], &mut dydt);
        assert!(dydt[0].abs() < 1e-9);

        field.derivative(0.0, &[10.0, 0.0, 0.0], &mut dydt);
        assert!(dydt[0] > 0.0);
    }
}
