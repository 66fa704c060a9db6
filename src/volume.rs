/// One timepoint's 8-bit intensity grid. `x` varies fastest, then `y`, then `z`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    dims: [usize; 3],
    voxels: Vec<u8>,
}

impl Volume {
    pub fn zeros(dims: [usize; 3]) -> Self {
        Volume { dims, voxels: vec![0; dims[0] * dims[1] * dims[2]] }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    pub fn contains(&self, x: i64, y: i64, z: i64) -> bool {
        x >= 0
            && y >= 0
            && z >= 0
            && (x as usize) < self.dims[0]
            && (y as usize) < self.dims[1]
            && (z as usize) < self.dims[2]
    }

    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.dims[1] + y) * self.dims[0] + x
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> u8 {
        self.voxels[self.index(x, y, z)]
    }

    pub fn set(&mut self, x: usize, y: usize, z: usize, value: u8) {
        let i = self.index(x, y, z);
        self.voxels[i] = value;
    }

    pub fn count_nonzero(&self) -> usize {
        self.voxels.iter().filter(|&&v| v != 0).count()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.voxels
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.voxels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x_is_the_fastest_axis() {
        let mut v = Volume::zeros([4, 3, 2]);
        v.set(1, 0, 0, 5);
        v.set(0, 1, 0, 6);
        v.set(0, 0, 1, 7);
        assert_eq!(v.as_slice()[1], 5);
        assert_eq!(v.as_slice()[4], 6);
        assert_eq!(v.as_slice()[12], 7);
        assert_eq!(v.count_nonzero(), 3);
        assert_eq!(v.get(0, 0, 1), 7);
    }

    #[test]
    fn bounds_check() {
        let v = Volume::zeros([4, 3, 2]);
        assert!(v.contains(3, 2, 1));
        assert!(!v.contains(4, 0, 0));
        assert!(!v.contains(0, -1, 0));
        assert_eq!(v.len(), 24);
    }
}
