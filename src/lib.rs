// uscheme: featherweight embeddable scheme interpreter.
//
// Copyright (C) 2020  the uscheme authors
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

#[macro_use]
extern crate lazy_static;

pub mod clock;
pub mod config;
pub mod env;
pub mod error;
pub mod eval;
pub mod heap;
pub mod interp;
pub mod json;
pub mod number;
pub mod port;
pub mod printer;
pub mod prims;
pub mod proc;
pub mod reader;
pub mod symbol;
pub mod value;

pub use crate::error::{Error, Result};
pub use crate::interp::Interp;
pub use crate::value::Value;
