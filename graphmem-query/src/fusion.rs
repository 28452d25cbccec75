// Copyright 2025 Sushanth (https://github.com/sushanthpy)
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

//! Reciprocal rank fusion.

use std::collections::HashMap;
use uuid::Uuid;

/// The conventional RRF smoothing constant.
pub const RRF_K: f32 = 60.0;

/// Fuse ranked candidate lists: each candidate scores `Σ 1/(κ + rank)` over
/// the lists it appears in, rank 1-based. Candidates missing from a list
/// simply contribute nothing for it.
pub fn reciprocal_rank_fusion(lists: &[Vec<Uuid>]) -> HashMap<Uuid, f32> {
    let mut fused: HashMap<Uuid, f32> = HashMap::new();
    for list in lists {
        for (idx, id) in list.iter().enumerate() {
            let rank = (idx + 1) as f32;
            *fused.entry(*id).or_default() += 1.0 / (RRF_K + rank);
        }
    }
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_list_preserves_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let fused = reciprocal_rank_fusion(&[vec![a, b]]);
        assert!(fused[&a] > fused[&b]);
        assert!((fused[&a] - 1.0 / 61.0).abs() < 1e-6);
        assert!((fused[&b] - 1.0 / 62.0).abs() < 1e-6);
    }

    #[test]
    fn appearing_in_both_lists_beats_one_top_rank() {
        let both = Uuid::new_v4();
        let top = Uuid::new_v4();
        // `both` is mid-rank in two lists; `top` leads one list only.
        let fused = reciprocal_rank_fusion(&[vec![top, both], vec![both]]);
        assert!(fused[&both] > fused[&top]);
    }

    #[test]
    fn empty_lists_fuse_to_nothing() {
        let fused = reciprocal_rank_fusion(&[Vec::new(), Vec::new()]);
        assert!(fused.is_empty());
    }
}
