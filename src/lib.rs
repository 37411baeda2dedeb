//! CMap: a concurrent hash map with lock-striped buckets and incremental, lazy resizing,
//! ported from Go's cmap.
//!
//! Operations on different buckets never contend. Growing or shrinking the table installs a
//! new bucket array atomically, but entries move to it one bucket at a time, on first touch,
//! so no single operation pays the full rehash cost.

use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicUsize, Ordering};

use ahash::{AHashMap, RandomState};
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};

// ================================================================================================
// CONSTANTS
// ================================================================================================

/// log2 of the initial bucket count.
const INIT_BIT: u8 = 4;

/// log2 of the largest bucket count the map will grow to.
const MAX_BIT: u8 = 16;

/// Bucket indices claimed per cooperative migration step.
const MIGRATE_CHUNK: usize = 16;

/// No resize in flight, or the previous one has fully drained.
const RESIZE_IDLE: u32 = 0;

/// A successor node exists and entries are still moving into it.
const RESIZE_MIGRATING: u32 = 1;

// ================================================================================================
// INTERNAL DATA STRUCTURES
// ================================================================================================

/// Contents of a bucket, guarded by the bucket's lock.
struct BucketState<K, V> {
    /// Set under the write lock when the bucket's node is being replaced. Never cleared.
    /// A frozen bucket is still readable but rejects writes; the writer retries on the
    /// current head node.
    frozen: bool,
    entries: AHashMap<K, V>,
}

/// One hash partition of a node. `init` is set with release ordering once the bucket has
/// pulled its share of entries from the predecessor node, so a reader that observes it also
/// observes the populated entries.
struct Bucket<K, V> {
    init: AtomicBool,
    state: RwLock<BucketState<K, V>>,
}

/// One generation of the bucket array. `old_node` points at the predecessor while entries
/// are still migrating out of it; once every bucket here has initialized, the predecessor is
/// retired through the epoch collector and the pointer goes null.
struct Node<K, V> {
    /// log2 of the bucket count.
    b: u8,
    /// `(1 << b) - 1`; a key lives in bucket `hash & mask`.
    mask: u64,
    resize: AtomicU32,
    /// Buckets not yet initialized. The thread that takes this to zero clears `old_node`.
    pending: AtomicUsize,
    /// Next bucket index to hand to a cooperative migration helper.
    migrate_cursor: AtomicUsize,
    old_node: Atomic<Node<K, V>>,
    buckets: Box<[Bucket<K, V>]>,
}

// ================================================================================================
// MAP
// ================================================================================================

/// A concurrent map of `K` to `V`, safe to share across threads behind a plain `&CMap`.
///
/// Lookups clone the stored value rather than handing out references into a bucket, so the
/// value type must be `Clone` (cheap types or `Arc` payloads work well). Keys and values
/// additionally need `Send + Sync + 'static` because entries migrate between tables on
/// whichever thread touches them and retired tables are freed by the epoch collector.
pub struct CMap<K, V, S = RandomState> {
    node: Atomic<Node<K, V>>,
    count: AtomicI64,
    /// Serializes lazy creation of the first node.
    init_lock: Mutex<()>,
    /// log2 of the first node's bucket count, derived from the capacity hint.
    init_bit: u8,
    hasher: S,
}

impl<K, V> CMap<K, V, RandomState> {
    /// Create an empty map with the default hasher.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty map sized so that roughly `capacity` entries fit before the first
    /// grow. The map still grows past the hint as needed.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::new())
    }
}

impl<K, V, S: BuildHasher> CMap<K, V, S> {
    /// Create an empty map using the provided hasher.
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(0, hasher)
    }

    /// Create an empty map with a capacity hint and the provided hasher. The hasher decides
    /// bucket placement, so it cannot be changed once the map exists.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            node: Atomic::null(),
            count: AtomicI64::new(0),
            init_lock: Mutex::new(()),
            init_bit: bit_for_capacity(capacity),
            hasher,
        }
    }
}

impl<K, V, S> CMap<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    // ============================================================================================
    // PUBLIC API
    // ============================================================================================

    /// Returns a clone of the value stored for `key`, if present.
    pub fn get(&self, key: &K) -> Option<V> {
        let guard = epoch::pin();
        let hash = self.hash(key);
        let (_, bucket) = self.get_node_and_bucket(hash, &guard);
        bucket.try_load(key)
    }

    /// Check whether the given key is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Sets the value for `key`, returning the previous value if the key was already
    /// present.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let guard = epoch::pin();
        let hash = self.hash(&key);
        let mut pair = (key, value);
        loop {
            let (node, bucket) = self.get_node_and_bucket(hash, &guard);
            let node_ref = unsafe { node.deref() };
            if node_ref.growing(&guard) {
                node_ref.help_migrate(&self.hasher, &guard);
            }
            match bucket.try_store(self, node, false, pair.0, pair.1, &guard) {
                Ok(prev) => return prev,
                // The bucket froze under us; retry against the current head.
                Err(returned) => pair = returned,
            }
        }
    }

    /// Returns the existing value for `key` if present, otherwise stores `value`.
    ///
    /// The boolean is `true` when the value was already there and `false` when this call
    /// stored it.
    pub fn get_or_insert(&self, key: K, value: V) -> (V, bool) {
        self.get_or_insert_with(key, || value)
    }

    /// Like [`get_or_insert`](Self::get_or_insert), but the value is built only if the key
    /// is absent. Under a race exactly one caller's value wins; every other caller gets the
    /// winner's value back with `true`.
    pub fn get_or_insert_with<F>(&self, key: K, f: F) -> (V, bool)
    where
        F: FnOnce() -> V,
    {
        let guard = epoch::pin();
        let hash = self.hash(&key);
        let mut key = key;
        let mut f = Some(f);
        let mut pending: Option<V> = None;
        loop {
            let (node, bucket) = self.get_node_and_bucket(hash, &guard);
            let node_ref = unsafe { node.deref() };
            if node_ref.growing(&guard) {
                node_ref.help_migrate(&self.hasher, &guard);
            }
            if let Some(existing) = bucket.try_load(&key) {
                return (existing, true);
            }
            let value = match pending.take() {
                Some(v) => v,
                None => f.take().unwrap()(),
            };
            let stored = value.clone();
            match bucket.try_store(self, node, true, key, value, &guard) {
                Ok(_) => return (stored, false),
                // Frozen bucket, or another thread inserted the key first; the next
                // iteration either finds the winner via try_load or stores on the new head.
                Err((k, v)) => {
                    key = k;
                    pending = Some(v);
                }
            }
        }
    }

    /// Removes `key` from the map, returning the value that was stored under it.
    pub fn remove(&self, key: &K) -> Option<V> {
        let guard = epoch::pin();
        let hash = self.hash(key);
        loop {
            let (node, bucket) = self.get_node_and_bucket(hash, &guard);
            let node_ref = unsafe { node.deref() };
            if node_ref.growing(&guard) {
                node_ref.help_migrate(&self.hasher, &guard);
            }
            if bucket.try_load(key).is_none() {
                return None;
            }
            if let Some(removed) = bucket.try_delete(self, node, key, &guard) {
                return removed;
            }
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// Exact when the map is quiescent; with writers in flight the value is a snapshot that
    /// may lag individual operations.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed).max(0) as usize
    }

    /// Returns true if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over clones of the map's entries.
    ///
    /// The iterator reads one generation of the table: entries inserted after it is created
    /// may or may not be seen, and a concurrently updated key may surface any value it held
    /// during the iteration, but no key is yielded twice. Each bucket is cloned under its
    /// read lock and yielded afterwards, so writers are never blocked for longer than one
    /// bucket copy. Dropping the iterator early simply stops the walk.
    pub fn iter(&self) -> Iter<'_, K, V, S> {
        Iter::new(self)
    }

    /// Returns an iterator over clones of the map's keys.
    pub fn keys(&self) -> Keys<'_, K, V, S> {
        Keys(self.iter())
    }

    /// Returns an iterator over clones of the map's values.
    pub fn values(&self) -> Values<'_, K, V, S> {
        Values(self.iter())
    }

    // ============================================================================================
    // NODE ACCESS
    // ============================================================================================

    #[inline]
    fn hash(&self, key: &K) -> u64 {
        self.hasher.hash_one(key)
    }

    /// Loads the head node, lazily allocating the first one.
    fn get_node<'g>(&self, guard: &'g Guard) -> Shared<'g, Node<K, V>> {
        let node = self.node.load(Ordering::Acquire, guard);
        if !node.is_null() {
            return node;
        }
        let _held = self.init_lock.lock();
        let node = self.node.load(Ordering::Acquire, guard);
        if !node.is_null() {
            return node;
        }
        let node = Owned::new(Node::new(self.init_bit, Atomic::null(), false)).into_shared(guard);
        self.node.store(node, Ordering::Release);
        node
    }

    fn get_node_and_bucket<'g>(
        &self,
        hash: u64,
        guard: &'g Guard,
    ) -> (Shared<'g, Node<K, V>>, &'g Bucket<K, V>) {
        let node = self.get_node(guard);
        let node_ref = unsafe { node.deref() };
        let bucket = node_ref.init_bucket((hash & node_ref.mask) as usize, &self.hasher, guard);
        (node, bucket)
    }

    // ============================================================================================
    // RESIZE
    // ============================================================================================

    /// Installs a node of `1 << new_b` buckets as the new head, with the current node linked
    /// behind it as the migration source. Only the thread that wins the `resize` flag builds
    /// the successor; everyone else returns and keeps operating through lazy bucket
    /// initialization.
    fn grow_work<'g>(&self, node: Shared<'g, Node<K, V>>, new_b: u8, guard: &'g Guard) {
        let node_ref = unsafe { node.deref() };
        if node_ref.growing(guard)
            || node_ref
                .resize
                .compare_exchange(
                    RESIZE_IDLE,
                    RESIZE_MIGRATING,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_err()
        {
            return;
        }
        let new_node = Owned::new(Node::new(new_b, Atomic::from(node), true)).into_shared(guard);
        // Only the resize winner reaches this swap, so it cannot lose the race.
        if self
            .node
            .compare_exchange(node, new_node, Ordering::AcqRel, Ordering::Acquire, guard)
            .is_err()
        {
            panic!("BUG: head swap failed after winning the resize flag");
        }
        unsafe { new_node.deref() }.help_migrate(&self.hasher, guard);
    }
}

// ================================================================================================
// NODE
// ================================================================================================

impl<K, V> Node<K, V> {
    fn new(b: u8, old_node: Atomic<Node<K, V>>, migrating: bool) -> Self {
        let len = 1usize << b;
        let buckets: Box<[Bucket<K, V>]> = (0..len).map(|_| Bucket::new()).collect();
        Self {
            b,
            mask: (len as u64) - 1,
            resize: AtomicU32::new(if migrating { RESIZE_MIGRATING } else { RESIZE_IDLE }),
            pending: AtomicUsize::new(len),
            migrate_cursor: AtomicUsize::new(0),
            old_node,
            buckets,
        }
    }

    /// True while entries are still migrating out of the predecessor node.
    fn growing(&self, guard: &Guard) -> bool {
        !self.old_node.load(Ordering::Acquire, guard).is_null()
    }
}

impl<K, V> Node<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Returns the bucket at `index`, initializing it first if this is its first touch.
    ///
    /// Initialization pulls the bucket's share of entries out of the predecessor node: on
    /// growth the one old bucket at the same low-order index (keeping only the keys whose
    /// hash lands here under the wider mask), on shrink the two old buckets that collapse
    /// into this one. The old bucket is frozen before anything is copied, so a concurrent
    /// writer can never commit an entry that the copy would miss.
    fn init_bucket<'a, S: BuildHasher>(
        &'a self,
        index: usize,
        hasher: &S,
        guard: &Guard,
    ) -> &'a Bucket<K, V> {
        let bucket = &self.buckets[index];
        if bucket.inited() {
            return bucket;
        }
        let mut state = bucket.state.write();
        if bucket.inited() {
            return bucket;
        }

        let old = self.old_node.load(Ordering::Acquire, guard);
        if let Some(old) = unsafe { old.as_ref() } {
            if self.mask > old.mask {
                // Growth: the old bucket splits between this bucket and its companion at
                // `index ^ (1 << old.b)`; the companion pulls its half when first touched.
                let old_bucket = old.init_bucket(index & old.mask as usize, hasher, guard);
                let frozen = old_bucket.freeze();
                for (k, v) in frozen.entries.iter() {
                    if hasher.hash_one(k) & self.mask == index as u64 {
                        state.entries.insert(k.clone(), v.clone());
                    }
                }
            } else {
                // Shrink: two old buckets collapse into this one.
                for old_index in [index, index + (1usize << self.b)] {
                    let old_bucket = old.init_bucket(old_index, hasher, guard);
                    let frozen = old_bucket.freeze();
                    for (k, v) in frozen.entries.iter() {
                        state.entries.insert(k.clone(), v.clone());
                    }
                }
            }
        }

        bucket.init.store(true, Ordering::Release);
        drop(state);
        self.finish_bucket(guard);
        bucket
    }

    /// Claim one chunk of bucket indices and force-initialize them.
    ///
    /// Called by the thread that installed a new head and by mutating operations that find
    /// the head still migrating. Each call does a bounded amount of work; the cursor runs
    /// out once the whole table has been claimed, and first-touch initialization covers any
    /// bucket regardless.
    fn help_migrate<S: BuildHasher>(&self, hasher: &S, guard: &Guard) {
        if !self.growing(guard) {
            return;
        }
        let len = self.buckets.len();
        let start = self.migrate_cursor.fetch_add(MIGRATE_CHUNK, Ordering::Relaxed);
        if start >= len {
            return;
        }
        for index in start..(start + MIGRATE_CHUNK).min(len) {
            self.init_bucket(index, hasher, guard);
        }
    }

    /// Account one initialized bucket; the last one retires the predecessor node and
    /// reopens this node for resize triggers.
    ///
    /// The `resize` flag is cleared only when a predecessor was actually drained. A node
    /// can also have its `pending` run out while it is the one being replaced (its
    /// untouched buckets get initialized by the successor's pulls), and its flag must stay
    /// set so it can never win a second resize.
    fn finish_bucket(&self, guard: &Guard) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            let old = self.old_node.swap(Shared::null(), Ordering::AcqRel, guard);
            if !old.is_null() {
                // Readers that still hold the old node are pinned, so destruction waits
                // for them.
                unsafe { guard.defer_destroy(old) };
                self.resize.store(RESIZE_IDLE, Ordering::Release);
            }
        }
    }
}

impl<K, V> Drop for Node<K, V> {
    fn drop(&mut self) {
        // The node is exclusively owned here; a predecessor still linked behind it (a
        // migration that never finished) goes down with it.
        unsafe {
            let old = self.old_node.load(Ordering::Relaxed, epoch::unprotected());
            if !old.is_null() {
                drop(old.into_owned());
            }
        }
    }
}

// ================================================================================================
// BUCKET
// ================================================================================================

impl<K, V> Bucket<K, V> {
    fn new() -> Self {
        Self {
            init: AtomicBool::new(false),
            state: RwLock::new(BucketState {
                frozen: false,
                entries: AHashMap::new(),
            }),
        }
    }

    #[inline]
    fn inited(&self) -> bool {
        self.init.load(Ordering::Acquire)
    }

    /// Close the bucket to writes and hand its entries to the migrating thread. The write
    /// guard keeps late writers parked until the copy is done; readers keep working once it
    /// drops. Freezing an already frozen bucket is a no-op.
    fn freeze(&self) -> RwLockWriteGuard<'_, BucketState<K, V>> {
        let mut state = self.state.write();
        state.frozen = true;
        state
    }
}

impl<K, V> Bucket<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn try_load(&self, key: &K) -> Option<V> {
        let state = self.state.read();
        state.entries.get(key).cloned()
    }

    /// Clone the bucket's entries so iteration can yield them without holding the lock.
    fn snapshot(&self) -> Vec<(K, V)> {
        let state = self.state.read();
        state
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Write `value` under `key`, returning the value it replaced.
    ///
    /// `Err` hands the pair back without writing: either the bucket froze (retry on the
    /// current head) or `check_absent` found the key already present. An insertion (as
    /// opposed to an overwrite) bumps the map count and evaluates the grow triggers.
    fn try_store<S: BuildHasher>(
        &self,
        map: &CMap<K, V, S>,
        node: Shared<'_, Node<K, V>>,
        check_absent: bool,
        key: K,
        value: V,
        guard: &Guard,
    ) -> Result<Option<V>, (K, V)> {
        let mut state = self.state.write();
        if state.frozen {
            return Err((key, value));
        }
        if check_absent && state.entries.contains_key(&key) {
            return Err((key, value));
        }
        let prev = state.entries.insert(key, value);
        let bucket_len = state.entries.len();
        drop(state);

        if prev.is_none() {
            let node_ref = unsafe { node.deref() };
            let count = map.count.fetch_add(1, Ordering::Relaxed) + 1;
            if over_load_factor(count, node_ref.b) || overflow_grow(bucket_len as i64, node_ref.b) {
                map.grow_work(node, node_ref.b + 1, guard);
            }
        }
        Ok(prev)
    }

    /// Remove `key`, returning the stored value. `None` means the bucket froze and the
    /// caller must retry; `Some(None)` means the key was already absent.
    fn try_delete<S: BuildHasher>(
        &self,
        map: &CMap<K, V, S>,
        node: Shared<'_, Node<K, V>>,
        key: &K,
        guard: &Guard,
    ) -> Option<Option<V>> {
        let mut state = self.state.write();
        if state.frozen {
            return None;
        }
        let Some(prev) = state.entries.remove(key) else {
            return Some(None);
        };
        drop(state);

        let node_ref = unsafe { node.deref() };
        let count = map.count.fetch_sub(1, Ordering::Relaxed) - 1;
        if below_shrink(count, node_ref.b) {
            map.grow_work(node, node_ref.b - 1, guard);
        }
        Some(Some(prev))
    }
}

// ================================================================================================
// DROP
// ================================================================================================

impl<K, V, S> Drop for CMap<K, V, S> {
    fn drop(&mut self) {
        // &mut self: no operation is in flight and no guard can reach the chain, so walking
        // it unprotected is fine. Nodes retired earlier sit with the epoch collector.
        unsafe {
            let node = self.node.load(Ordering::Relaxed, epoch::unprotected());
            if !node.is_null() {
                drop(node.into_owned());
            }
        }
    }
}

// ================================================================================================
// STANDARD TRAIT IMPLEMENTATIONS
// ================================================================================================

impl<K, V, S: BuildHasher + Default> Default for CMap<K, V, S> {
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> fmt::Debug for CMap<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static + fmt::Debug,
    V: Clone + Send + Sync + 'static + fmt::Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> FromIterator<(K, V)> for CMap<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let map = CMap::with_hasher(S::default());
        for (k, v) in iter {
            let _ = map.insert(k, v);
        }
        map
    }
}

impl<K, V, S> Extend<(K, V)> for CMap<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            let _ = self.insert(k, v);
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a CMap<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    type Item = (K, V);
    type IntoIter = Iter<'a, K, V, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ================================================================================================
// ITERATORS
// ================================================================================================

/// Iterator over clones of a map's entries. See [`CMap::iter`] for the consistency
/// contract.
pub struct Iter<'a, K, V, S = RandomState>
where
    S: BuildHasher,
{
    map: &'a CMap<K, V, S>,
    // Keeps the snapshotted node alive for as long as the iterator exists; `node` must not
    // be dereferenced after `guard` drops.
    guard: Guard,
    node: *const Node<K, V>,
    bucket_index: usize,
    entries: Vec<(K, V)>,
    entry_index: usize,
}

impl<'a, K, V, S> Iter<'a, K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    fn new(map: &'a CMap<K, V, S>) -> Self {
        let guard = epoch::pin();
        let node = map.get_node(&guard).as_raw();
        Self {
            map,
            guard,
            node,
            bucket_index: 0,
            entries: Vec::new(),
            entry_index: 0,
        }
    }
}

impl<'a, K, V, S> Iterator for Iter<'a, K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        loop {
            if self.entry_index < self.entries.len() {
                let pair = self.entries[self.entry_index].clone();
                self.entry_index += 1;
                return Some(pair);
            }
            // SAFETY: the pinned guard keeps the snapshotted node from being reclaimed.
            let node = unsafe { &*self.node };
            if self.bucket_index > node.mask as usize {
                return None;
            }
            let bucket = node.init_bucket(self.bucket_index, &self.map.hasher, &self.guard);
            self.entries = bucket.snapshot();
            self.entry_index = 0;
            self.bucket_index += 1;
        }
    }
}

/// Iterator over clones of a map's keys.
pub struct Keys<'a, K, V, S = RandomState>(Iter<'a, K, V, S>)
where
    S: BuildHasher;

impl<'a, K, V, S> Iterator for Keys<'a, K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    type Item = K;

    fn next(&mut self) -> Option<K> {
        self.0.next().map(|(k, _)| k)
    }
}

/// Iterator over clones of a map's values.
pub struct Values<'a, K, V, S = RandomState>(Iter<'a, K, V, S>)
where
    S: BuildHasher;

impl<'a, K, V, S> Iterator for Values<'a, K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    type Item = V;

    fn next(&mut self) -> Option<V> {
        self.0.next().map(|(_, v)| v)
    }
}

// ================================================================================================
// UTILITY FUNCTIONS
// ================================================================================================

/// Smallest `b` whose grow threshold clears the capacity hint.
fn bit_for_capacity(capacity: usize) -> u8 {
    let mut b = INIT_BIT;
    while b < MAX_BIT && (1usize << (2 * b)) <= capacity {
        b += 1;
    }
    b
}

/// Grow once the whole map holds `1 << (2 * b)` entries.
#[inline]
fn over_load_factor(count: i64, b: u8) -> bool {
    b < MAX_BIT && count >= 1i64 << (2 * b)
}

/// Grow when a single bucket exceeds `1 << (b + 1)` entries, which catches lopsided hash
/// distributions long before the global threshold trips.
#[inline]
fn overflow_grow(bucket_len: i64, b: u8) -> bool {
    b < MAX_BIT && bucket_len > 1i64 << (b + 1)
}

/// Shrink once the map drops below `1 << (b - 1)` entries, but never below the initial
/// table size.
#[inline]
fn below_shrink(count: i64, b: u8) -> bool {
    b > INIT_BIT + 1 && count < 1i64 << (b - 1)
}
