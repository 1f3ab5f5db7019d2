/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

#![deny(unconditional_recursion)]

pub mod bits;
pub mod dict;
pub mod mph;
pub mod utils;

pub mod prelude {
    pub use crate::bits::*;
    pub use crate::dict::*;
    pub use crate::mph::*;
    pub use crate::utils::*;
}
