// ─────────────────────────────────────────────────────────────────────
// SCPN Neutron Transport — MOC Math
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
pub mod expeval;
pub mod quadrature;
pub mod reduce;
