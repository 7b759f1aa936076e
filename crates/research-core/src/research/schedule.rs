//! Breadth decay between recursion levels
//!
//! Depth always drops by one per level, so every policy terminates. Breadth
//! decides how many sub-queries each child level may plan.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ResearchError;

/// How breadth shrinks from one level to the next
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreadthDecay {
    /// `ceil(breadth / 2)`: wide first, narrow and deep later
    #[default]
    Halving,
    /// `breadth - 1`, never below 1
    Decrement,
    /// Same breadth at every level
    Constant,
}

impl BreadthDecay {
    pub fn next_breadth(&self, breadth: usize) -> usize {
        match self {
            Self::Halving => breadth.div_ceil(2),
            Self::Decrement => breadth.saturating_sub(1).max(1).min(breadth),
            Self::Constant => breadth,
        }
    }

    /// Fan-out requested at each level, top first, for one root-to-leaf path
    pub fn fan_outs(&self, breadth: usize, depth: usize, max_fan_out: usize) -> Vec<usize> {
        let mut widths = Vec::with_capacity(depth);
        let mut current = breadth;
        for _ in 0..depth {
            if current == 0 {
                break;
            }
            widths.push(current.min(max_fan_out));
            current = self.next_breadth(current);
        }
        widths
    }

    /// Worst-case number of sub-queries a run may issue, summed over the tree.
    ///
    /// The planner may return fewer queries than requested, so this is an
    /// upper bound, never an estimate.
    pub fn max_sub_queries(&self, breadth: usize, depth: usize, max_fan_out: usize) -> usize {
        let mut total = 0usize;
        let mut nodes_at_level = 1usize;
        for width in self.fan_outs(breadth, depth, max_fan_out) {
            nodes_at_level = nodes_at_level.saturating_mul(width);
            total = total.saturating_add(nodes_at_level);
        }
        total
    }
}

impl fmt::Display for BreadthDecay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Halving => "halving",
            Self::Decrement => "decrement",
            Self::Constant => "constant",
        };
        f.write_str(name)
    }
}

impl FromStr for BreadthDecay {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "halving" | "halve" | "half" => Ok(Self::Halving),
            "decrement" | "linear" => Ok(Self::Decrement),
            "constant" | "fixed" => Ok(Self::Constant),
            other => Err(ResearchError::Config(format!(
                "unknown breadth decay '{}', expected halving, decrement or constant",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halving() {
        let decay = BreadthDecay::Halving;
        assert_eq!(decay.next_breadth(4), 2);
        assert_eq!(decay.next_breadth(3), 2);
        assert_eq!(decay.next_breadth(1), 1);
    }

    #[test]
    fn test_decrement_floor() {
        let decay = BreadthDecay::Decrement;
        assert_eq!(decay.next_breadth(3), 2);
        assert_eq!(decay.next_breadth(1), 1);
        assert_eq!(decay.next_breadth(0), 0);
    }

    #[test]
    fn test_fan_outs() {
        assert_eq!(BreadthDecay::Halving.fan_outs(4, 2, 10), vec![4, 2]);
        assert_eq!(BreadthDecay::Halving.fan_outs(4, 0, 10), Vec::<usize>::new());
        assert_eq!(BreadthDecay::Constant.fan_outs(12, 2, 5), vec![5, 5]);
    }

    #[test]
    fn test_max_sub_queries() {
        // 4 at the top, then 2 under each of the 4
        assert_eq!(BreadthDecay::Halving.max_sub_queries(4, 2, 10), 4 + 8);
        assert_eq!(BreadthDecay::Halving.max_sub_queries(2, 1, 10), 2);
        assert_eq!(BreadthDecay::Halving.max_sub_queries(3, 0, 10), 0);
    }

    #[test]
    fn test_parse() {
        assert_eq!("Halving".parse::<BreadthDecay>().unwrap(), BreadthDecay::Halving);
        assert_eq!("linear".parse::<BreadthDecay>().unwrap(), BreadthDecay::Decrement);
        assert!("exponential".parse::<BreadthDecay>().is_err());
        assert_eq!(BreadthDecay::Constant.to_string(), "constant");
    }
}
