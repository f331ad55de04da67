// Chroma
// Copyright (c) 2026 The Project Chroma Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `coeffs` module is the registry of named filter coefficient sets.
//!
//! Every filter used by the decoders is constructed by looking up its coefficients here by
//! symbolic name. The sets below were designed for an 8 x Fsc NTSC capture rate (approximately
//! 28.636 MHz) and are shared, immutable data; delay-line state lives in the [`Filter`]
//! instances handed out by [`filter`].

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::dsp::filter::Filter;

/// A named set of difference-equation coefficients.
///
/// `a` is absent for pure FIR sets.
#[derive(Copy, Clone)]
pub struct FilterSpec {
    pub order: usize,
    pub a: Option<&'static [f64]>,
    pub b: &'static [f64],
}

// 30-tap 1.3 MHz low-pass, used to select the demodulated chroma products.
static CHROMA_1_3MHZ_B30: [f64; 31] = [
    4.914004914004915e-03, 5.531455998921954e-03, 7.356823678403171e-03, 1.031033062576930e-02,
    1.426289441492169e-02, 1.904176904176904e-02, 2.443809475353342e-02, 3.021602622216704e-02,
    3.612304011689930e-02, 4.190097158553291e-02, 4.729729729729729e-02, 5.207617192414463e-02,
    5.602873571329703e-02, 5.898224266066317e-02, 6.080761034014438e-02, 6.142506142506142e-02,
    6.080761034014438e-02, 5.898224266066317e-02, 5.602873571329704e-02, 5.207617192414465e-02,
    4.729729729729731e-02, 4.190097158553292e-02, 3.612304011689932e-02, 3.021602622216705e-02,
    2.443809475353343e-02, 1.904176904176904e-02, 1.426289441492169e-02, 1.031033062576930e-02,
    7.356823678403167e-03, 5.531455998921954e-03, 4.914004914004915e-03,
];
// 65-tap 0.6 MHz low-pass, used to narrow the colour burst for phase detection.
static BURST_0_6MHZ_B65: [f64; 66] = [
    2.274019329164298e-03, 2.335061058268382e-03, 2.517616315402780e-03, 2.819980631318463e-03,
    3.239330911865343e-03, 3.771751796461725e-03, 4.412272214761106e-03, 5.154911800196637e-03,
    5.992736727052425e-03, 6.917924449726024e-03, 7.921836739729059e-03, 8.995100338499179e-03,
    1.012769447298977e-02, 1.130904441692792e-02, 1.252812022418446e-02, 1.377353971240908e-02,
    1.503367473540020e-02, 1.629675975197302e-02, 1.755100167764746e-02, 1.878468999350057e-02,
    1.998630608412639e-02, 2.114463078384454e-02, 2.224884912702732e-02, 2.328865132451982e-02,
    2.425432902336347e-02, 2.513686595107182e-02, 2.592802209813746e-02, 2.662041065278063e-02,
    2.720756696962055e-02, 2.768400892832751e-02, 2.804528811870335e-02, 2.828803137428890e-02,
    2.840997226671035e-02, 2.840997226671035e-02, 2.828803137428890e-02, 2.804528811870335e-02,
    2.768400892832751e-02, 2.720756696962055e-02, 2.662041065278064e-02, 2.592802209813747e-02,
    2.513686595107182e-02, 2.425432902336347e-02, 2.328865132451982e-02, 2.224884912702732e-02,
    2.114463078384455e-02, 1.998630608412640e-02, 1.878468999350057e-02, 1.755100167764746e-02,
    1.629675975197302e-02, 1.503367473540020e-02, 1.377353971240908e-02, 1.252812022418446e-02,
    1.130904441692792e-02, 1.012769447298977e-02, 8.995100338499189e-03, 7.921836739729063e-03,
    6.917924449726024e-03, 5.992736727052432e-03, 5.154911800196641e-03, 4.412272214761106e-03,
    3.771751796461728e-03, 3.239330911865346e-03, 2.819980631318465e-03, 2.517616315402780e-03,
    2.335061058268382e-03, 2.274019329164298e-03,
];
// 8-tap low-pass over observed inter-sync gaps, yielding the corrected line-length estimate.
static HSYNC_B8: [f64; 9] = [
    1.447786467971050e-02, 4.395811440315845e-02, 1.202636955256379e-01, 2.024216184054497e-01,
    2.377574139720867e-01, 2.024216184054497e-01, 1.202636955256379e-01, 4.395811440315847e-02,
    1.447786467971050e-02,
];
// 7th-order 4.2 MHz in-band low-pass applied to reconstructed luma.
static LUMA_4_2MHZ_B7: [f64; 8] = [
    -6.2211448918489030e-04, 2.8265367663495418e-02, 1.5675884606312396e-01, 3.1559790076256550e-01,
    3.1559790076256550e-01, 1.5675884606312396e-01, 2.8265367663495432e-02, -6.2211448918488910e-04,
];

lazy_static! {
    static ref FILTERS: HashMap<&'static str, FilterSpec> = {
        let mut m = HashMap::new();
        m.insert(
            "chroma_1_3mhz_b30",
            FilterSpec { order: 30, a: None, b: &CHROMA_1_3MHZ_B30[..] },
        );
        m.insert(
            "burst_0_6mhz_b65",
            FilterSpec { order: 65, a: None, b: &BURST_0_6MHZ_B65[..] },
        );
        m.insert("hsync_b8", FilterSpec { order: 8, a: None, b: &HSYNC_B8[..] });
        m.insert("luma_4_2mhz_b7", FilterSpec { order: 7, a: None, b: &LUMA_4_2MHZ_B7[..] });
        m
    };
}

/// Look up a coefficient set by name.
pub fn spec(name: &str) -> Option<FilterSpec> {
    FILTERS.get(name).copied()
}

/// Construct a fresh filter from a named coefficient set.
///
/// The name must exist in the registry; an unknown name is a programmer error and will panic.
pub fn filter(name: &str) -> Filter {
    match spec(name) {
        Some(spec) => Filter::new(spec.order, spec.a, spec.b),
        None => panic!("unknown filter coefficient set: {}", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_registry_lookup() {
        for name in ["chroma_1_3mhz_b30", "burst_0_6mhz_b65", "hsync_b8", "luma_4_2mhz_b7"] {
            let spec = spec(name).unwrap();
            assert_eq!(spec.b.len(), spec.order + 1);
            assert!(spec.a.is_none());
        }

        assert!(spec("butter6").is_none());
    }

    #[test]
    fn verify_low_pass_sets_have_unity_dc_gain() {
        // All of the registered sets are normalized low-pass designs.
        for name in ["chroma_1_3mhz_b30", "burst_0_6mhz_b65", "hsync_b8", "luma_4_2mhz_b7"] {
            let sum: f64 = spec(name).unwrap().b.iter().sum();
            assert!((sum - 1.0).abs() < 1e-3, "{} sums to {}", name, sum);
        }
    }

    #[test]
    fn verify_filter_construction() {
        let mut f = filter("hsync_b8");
        for _ in 0..16 {
            f.feed(1820.0);
        }
        assert!((f.peek() - 1820.0).abs() < 1e-6);
    }
}
