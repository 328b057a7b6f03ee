// Copyright 2025 Freelance Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Freelance CLI
//!
//! Command-line interface for the Freelance request/reply runtime.
//!
//! ## Key Commands
//!
//! - `freelance serve`: Start a reply server answering keyed requests
//! - `freelance request`: Send keyed requests to a set of servers, failing over
//!   between them
//! - `freelance watch`: Ping a set of servers and print their liveness
//!
//! Results are printed to stdout as one JSON object per line; logs go to
//! stderr.

pub mod report;
