use std::collections::HashMap;
use std::sync::Arc;

use image::RgbaImage;
use log::debug;

/// 缓存键：同一页不同分辨率是不同的条目
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderKey {
    pub page_index: usize,
    pub width: u32,
    pub height: u32,
}

impl RenderKey {
    pub fn new(page_index: usize, width: u32, height: u32) -> Self {
        Self {
            page_index,
            width,
            height,
        }
    }
}

/// 渲染好的页面位图
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub index: usize,
    pub image: RgbaImage,
}

impl RenderedPage {
    /// 像素数量不匹配时返回 None
    pub fn from_rgba(index: usize, width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, pixels).map(|image| Self { index, image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn key(&self) -> RenderKey {
        RenderKey::new(self.index, self.width(), self.height())
    }
}

struct CachedPage {
    page: Arc<RenderedPage>,
    last_used: u64,
}

/// 渲染结果缓存，满了淘汰最久未使用的条目
pub struct RenderCache {
    entries: HashMap<RenderKey, CachedPage>,
    capacity: usize,
    tick: u64,
}

impl RenderCache {
    /// 容量至少为 1
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            tick: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &RenderKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&mut self, key: &RenderKey) -> Option<Arc<RenderedPage>> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(key).map(|cached| {
            cached.last_used = tick;
            Arc::clone(&cached.page)
        })
    }

    pub fn put(&mut self, key: RenderKey, page: RenderedPage) -> Arc<RenderedPage> {
        self.tick += 1;
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.capacity {
                self.evict_lru();
            }
        }

        let page = Arc::new(page);
        self.entries.insert(
            key,
            CachedPage {
                page: Arc::clone(&page),
                last_used: self.tick,
            },
        );
        page
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!("[RenderCache] clear {} entries", self.entries.len());
        }
        self.entries.clear();
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, cached)| cached.last_used)
            .map(|(key, _)| *key);

        if let Some(key) = oldest {
            debug!("[RenderCache] evict {:?}", key);
            self.entries.remove(&key);
        }
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(index: usize, width: u32, height: u32) -> RenderedPage {
        RenderedPage::from_rgba(index, width, height, vec![0; (width * height * 4) as usize])
            .unwrap()
    }

    #[test]
    fn capacity_is_at_least_one() {
        let mut cache = RenderCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put(RenderKey::new(0, 2, 2), page(0, 2, 2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn keys_include_resolution() {
        let mut cache = RenderCache::new(4);
        cache.put(RenderKey::new(0, 2, 2), page(0, 2, 2));
        assert!(cache.get(&RenderKey::new(0, 2, 2)).is_some());
        assert!(cache.get(&RenderKey::new(0, 4, 4)).is_none());
        assert!(cache.get(&RenderKey::new(1, 2, 2)).is_none());
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = RenderCache::new(2);
        let a = RenderKey::new(0, 1, 1);
        let b = RenderKey::new(1, 1, 1);
        let c = RenderKey::new(2, 1, 1);
        cache.put(a, page(0, 1, 1));
        cache.put(b, page(1, 1, 1));
        cache.get(&a);
        cache.put(c, page(2, 1, 1));

        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
    }

    #[test]
    fn replacing_a_key_does_not_evict_others() {
        let mut cache = RenderCache::new(2);
        let a = RenderKey::new(0, 1, 1);
        let b = RenderKey::new(1, 1, 1);
        cache.put(a, page(0, 1, 1));
        cache.put(b, page(1, 1, 1));
        cache.put(a, page(0, 1, 1));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&b));
    }

    #[test]
    fn rejects_short_pixel_buffers() {
        assert!(RenderedPage::from_rgba(0, 2, 2, vec![0; 3]).is_none());
        assert_eq!(page(3, 5, 7).key(), RenderKey::new(3, 5, 7));
    }
}
