//! Bit-trie keyed by IP prefix for longest-prefix routing.

use ipnet::IpNet;
use std::net::IpAddr;

#[derive(Debug)]
struct Node<T> {
    children: [Option<Box<Node<T>>>; 2],
    value: Option<T>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            children: [None, None],
            value: None,
        }
    }
}

impl<T> Node<T> {
    fn insert(&mut self, key: u128, depth: u8, value: T) {
        let mut node = self;
        for i in 0..depth {
            let bit = ((key >> (127 - i)) & 1) as usize;
            node = &mut **node.children[bit].get_or_insert_with(Default::default);
        }
        node.value = Some(value);
    }

    /// Deepest populated node along the key is the longest prefix.
    fn longest<'a>(&'a self, key: u128, max_depth: u8) -> Option<&'a T> {
        let mut best = self.value.as_ref();
        let mut node = self;
        for i in 0..max_depth {
            let bit = ((key >> (127 - i)) & 1) as usize;
            match &node.children[bit] {
                Some(child) => {
                    node = &**child;
                    if node.value.is_some() {
                        best = node.value.as_ref();
                    }
                }
                None => break,
            }
        }
        best
    }
}

/// Longest-prefix-match table over separate /32 and /128 tries. IPv4-mapped
/// IPv6 queries land in the v4 trie.
#[derive(Debug)]
pub struct PrefixTree<T> {
    v4: Node<T>,
    v6: Node<T>,
}

impl<T> Default for PrefixTree<T> {
    fn default() -> Self {
        Self {
            v4: Node::default(),
            v6: Node::default(),
        }
    }
}

impl<T> PrefixTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, net: IpNet, value: T) {
        match net {
            IpNet::V4(n) => {
                let key = (u32::from(n.network()) as u128) << 96;
                self.v4.insert(key, n.prefix_len(), value);
            }
            IpNet::V6(n) => {
                let key = u128::from(n.network());
                self.v6.insert(key, n.prefix_len(), value);
            }
        }
    }

    pub fn longest_match(&self, ip: IpAddr) -> Option<&T> {
        match canonical(ip) {
            IpAddr::V4(v4) => {
                let key = (u32::from(v4) as u128) << 96;
                self.v4.longest(key, 32)
            }
            IpAddr::V6(v6) => self.v6.longest(u128::from(v6), 128),
        }
    }
}

fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}
