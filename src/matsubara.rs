use num::complex::Complex64;
use std::f64::consts::PI;

/// Fermionic frequencies $\omega_n=(2n+1)\pi/\beta$ for $n=0..N$.
pub fn matsubara_frequencies(beta: f64, n: usize) -> Vec<f64> {
    (0..n).map(|k| (2 * k + 1) as f64 * PI / beta).collect()
}

/// High frequency expansion
/// $G(i\omega)\simeq c_1/i\omega+c_2/(i\omega)^2+c_3/(i\omega)^3$.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tail {
    pub c1: f64,
    pub c2: f64,
    pub c3: f64,
}

impl Tail {
    pub fn new(c1: f64, c2: f64, c3: f64) -> Self {
        Tail { c1, c2, c3 }
    }

    pub fn freq(&self, wn: f64) -> Complex64 {
        let iw = Complex64::new(0.0, wn);
        self.c1 / iw + self.c2 / (iw * iw) + self.c3 / (iw * iw * iw)
    }

    /// Imaginary time form on $\[0,\beta)$.
    pub fn tau(&self, tau: f64, beta: f64) -> f64 {
        -self.c1 / 2.0
            + self.c2 * (2.0 * tau - beta) / 4.0
            + self.c3 * (beta * tau - tau * tau) / 4.0
    }

    /// First two moments read from the jump and the kink at $\tau=0$.
    /// `diagonal` fixes the jump $G(0^+)+G(\beta^-)=-1$ of a diagonal block.
    pub fn from_endpoints(gtau: &[f64], dtau: f64, diagonal: bool) -> Self {
        let n = gtau.len();
        let jump = if diagonal { 1.0 } else { 0.0 };
        if n < 2 {
            return Tail::new(jump, 0.0, 0.0);
        }
        let g_beta = -jump - gtau[0];
        let c2 = (gtau[1] - gtau[0]) / dtau + (g_beta - gtau[n - 1]) / dtau;
        Tail::new(jump, c2, 0.0)
    }
}

/// $G(\tau)$ from $G(i\omega_n)$ on positive frequencies, the tail is treated
/// analytically.
pub fn gw_invfouriertrans(giw: &[Complex64], taus: &[f64], wn: &[f64], tail: &Tail, beta: f64) -> Vec<f64> {
    taus.iter()
        .map(|&tau| {
            let mut sum = 0.0;
            for (g, &w) in giw.iter().zip(wn.iter()) {
                let phase = Complex64::new(0.0, -w * tau).exp();
                sum += ((g - tail.freq(w)) * phase).re;
            }
            2.0 / beta * sum + tail.tau(tau, beta)
        })
        .collect()
}

/// $G(i\omega_n)$ from $G(\tau_l)$ with $\tau_l=l\Delta\tau$. The tail subtracted
/// integrand is continuous and periodic so the rectangle rule is used.
pub fn gt_fouriertrans(gtau: &[f64], taus: &[f64], wn: &[f64], tail: &Tail, beta: f64) -> Vec<Complex64> {
    let dtau = beta / gtau.len() as f64;
    wn.iter()
        .map(|&w| {
            let mut sum = Complex64::new(0.0, 0.0);
            for (g, &tau) in gtau.iter().zip(taus.iter()) {
                let phase = Complex64::new(0.0, w * tau).exp();
                sum += phase * (g - tail.tau(tau, beta));
            }
            sum * dtau + tail.freq(w)
        })
        .collect()
}

/// Local Green's function of the Bethe lattice,
/// $G(z)=2(z-\sqrt{z^2-D^2})/D^2$ with $z=i\omega_n+\mu$.
pub fn semicircle(wn: &[f64], mu: f64, half_bandwidth: f64) -> Vec<Complex64> {
    wn.iter()
        .map(|&w| semicircle_at(Complex64::new(mu, w), half_bandwidth))
        .collect()
}

pub(crate) fn semicircle_at(z: Complex64, half_bandwidth: f64) -> Complex64 {
    let d2 = half_bandwidth * half_bandwidth;
    let root = (z * z - d2).sqrt();
    let g = 2.0 * (z - root) / d2;
    // Retarded branch, Im G and Im z of opposite sign.
    if g.im * z.im > 0.0 {
        2.0 * (z + root) / d2
    } else {
        g
    }
}

#[cfg(test)]
mod test {
    use assert::close;

    use super::*;

    #[test]
    fn first_frequencies() {
        let wn = matsubara_frequencies(PI, 3);
        close(wn[0], 1.0, 1e-15);
        close(wn[1], 3.0, 1e-15);
        close(wn[2], 5.0, 1e-15);
    }

    #[test]
    fn semicircle_is_retarded_and_decays() {
        let beta = 16.0;
        let wn = matsubara_frequencies(beta, 64);
        let g = semicircle(&wn, 0.0, 1.0);
        for (gi, &w) in g.iter().zip(wn.iter()) {
            assert!(gi.im < 0.0);
            close(gi.re, 0.0, 1e-12);
            // |G| < 1/w for a normalised density of states.
            assert!(gi.norm() <= 1.0 / w + 1e-12);
        }
        close(g[63].im * wn[63], -1.0, 1e-3);
    }

    #[test]
    fn free_level_round_trip() {
        // G(iw) = 1/(iw - e), G(tau) = -exp(-e tau)/(1 + exp(-beta e)).
        let beta = 10.0;
        let e = 0.3;
        let n_tau = 256;
        let taus: Vec<f64> = (0..n_tau).map(|l| l as f64 * beta / n_tau as f64).collect();
        let wn = matsubara_frequencies(beta, 2048);
        let giw: Vec<Complex64> = wn.iter().map(|&w| 1.0 / Complex64::new(-e, w)).collect();
        let tail = Tail::new(1.0, e, e * e);
        let gtau = gw_invfouriertrans(&giw, &taus, &wn, &tail, beta);
        for (g, &tau) in gtau.iter().zip(taus.iter()) {
            let exact = -<f64>::exp(-e * tau) / (1.0 + <f64>::exp(-beta * e));
            close(*g, exact, 1e-6);
        }
        let back = gt_fouriertrans(&gtau, &taus, &wn[..16], &tail, beta);
        for (b, g) in back.iter().zip(giw.iter()) {
            close(b.re, g.re, 2e-4);
            close(b.im, g.im, 2e-4);
        }
    }

    #[test]
    fn moments_from_endpoints() {
        let beta = 10.0;
        let e = 0.3;
        let n_tau = 4096;
        let dtau = beta / n_tau as f64;
        let gtau: Vec<f64> = (0..n_tau)
            .map(|l| -<f64>::exp(-e * l as f64 * dtau) / (1.0 + <f64>::exp(-beta * e)))
            .collect();
        let tail = Tail::from_endpoints(&gtau, dtau, true);
        close(tail.c1, 1.0, 0.0);
        close(tail.c2, e, 1e-3);
    }
}
